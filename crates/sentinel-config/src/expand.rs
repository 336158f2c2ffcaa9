//! Environment-variable expansion for process argument strings.
//!
//! `$NAME` and `${NAME}` are replaced by the variable's value. Unset
//! variables expand to nothing. A `$` that does not start a reference is kept
//! verbatim.

use std::env;

/// Expands environment references using the process environment.
#[must_use]
pub fn expand_env(input: &str) -> String {
    expand_with(input, |name| env::var(name).ok())
}

/// Expands references using `lookup` to resolve variable names.
#[must_use]
pub fn expand_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(current) = chars.next() {
        if current != '$' {
            output.push(current);
            continue;
        }
        match chars.peek() {
            Some('{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    name.push(next);
                }
                if closed {
                    output.push_str(&lookup(&name).unwrap_or_default());
                } else {
                    output.push_str("${");
                    output.push_str(&name);
                }
            }
            Some(next) if is_name_start(*next) => {
                let mut name = String::new();
                while let Some(next) = chars.peek().copied() {
                    if !is_name_char(next) {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                output.push_str(&lookup(&name).unwrap_or_default());
            }
            _ => output.push('$'),
        }
    }
    output
}

const fn is_name_start(character: char) -> bool {
    character.is_ascii_alphabetic() || character == '_'
}

const fn is_name_char(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '_'
}
