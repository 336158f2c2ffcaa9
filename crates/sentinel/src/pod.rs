//! Externally provisioned resources ("pods") attached to in-process workers.
//!
//! The supervisor never builds pods itself. It asks a [`PodProvider`] for a
//! connection, then for a pod wrapping that connection, and closes the
//! connection again when the worker holding the pod is reaped.

use std::fmt;
use std::sync::Arc;

use sentinel_config::Config;

use crate::error::PodError;

/// Handle to the resource a pod is built on, typically a database connection.
pub trait Connection: Send + Sync + fmt::Debug {
    /// Releases the underlying handle. Must tolerate repeated calls.
    fn close(&self);
}

/// Opaque resource handed to a worker that declares it needs one.
pub trait Pod: Send + Sync + fmt::Debug {
    /// The connection this pod was built on.
    fn connection(&self) -> Arc<dyn Connection>;
}

/// Factory for connections and pods.
#[cfg_attr(test, mockall::automock)]
pub trait PodProvider {
    /// Opens a new connection for `group`.
    ///
    /// # Errors
    ///
    /// Returns a [`PodError`] when the connection cannot be opened.
    fn new_connection(&self, config: &Config, group: &str)
    -> Result<Arc<dyn Connection>, PodError>;

    /// Builds a pod on top of `connection`.
    ///
    /// # Errors
    ///
    /// Returns a [`PodError`] when the pod cannot be built. The caller closes
    /// the connection in that case.
    fn new_pod(
        &self,
        config: &Config,
        group: &str,
        connection: Arc<dyn Connection>,
    ) -> Result<Arc<dyn Pod>, PodError>;
}

impl<T> PodProvider for Arc<T>
where
    T: PodProvider + ?Sized,
{
    fn new_connection(
        &self,
        config: &Config,
        group: &str,
    ) -> Result<Arc<dyn Connection>, PodError> {
        (**self).new_connection(config, group)
    }

    fn new_pod(
        &self,
        config: &Config,
        group: &str,
        connection: Arc<dyn Connection>,
    ) -> Result<Arc<dyn Pod>, PodError> {
        (**self).new_pod(config, group, connection)
    }
}

/// Provider for deployments where no worker needs a pod.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPods;

impl PodProvider for NoPods {
    fn new_connection(
        &self,
        _config: &Config,
        _group: &str,
    ) -> Result<Arc<dyn Connection>, PodError> {
        Err(PodError::Unavailable)
    }

    fn new_pod(
        &self,
        _config: &Config,
        _group: &str,
        connection: Arc<dyn Connection>,
    ) -> Result<Arc<dyn Pod>, PodError> {
        connection.close();
        Err(PodError::Unavailable)
    }
}

/// Opens a connection and builds a pod on it, closing the connection again
/// if the pod cannot be built.
pub(crate) fn provision<P>(
    provider: &P,
    config: &Config,
    group: &str,
) -> Result<Arc<dyn Pod>, PodError>
where
    P: PodProvider + ?Sized,
{
    let connection = provider.new_connection(config, group)?;
    provider
        .new_pod(config, group, Arc::clone(&connection))
        .inspect_err(|_| connection.close())
}

/// Closes the connection backing `pod`.
pub(crate) fn release(pod: &dyn Pod) {
    pod.connection().close();
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Default)]
    struct CountingConnection {
        closed: AtomicUsize,
    }

    impl Connection for CountingConnection {
        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn failed_pod_construction_closes_connection() {
        let connection = Arc::new(CountingConnection::default());
        let handed_out = Arc::clone(&connection);
        let mut provider = MockPodProvider::new();
        provider
            .expect_new_connection()
            .times(1)
            .returning(move |_, _| Ok(Arc::clone(&handed_out) as Arc<dyn Connection>));
        provider.expect_new_pod().times(1).returning(|_, _, _| {
            Err(PodError::Construction {
                message: "no schema".into(),
            })
        });

        let error = provision(&provider, &Config::default(), "a").expect_err("must fail");
        assert!(matches!(error, PodError::Construction { .. }));
        assert_eq!(connection.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connection_failure_is_propagated() {
        let mut provider = MockPodProvider::new();
        provider.expect_new_connection().returning(|_, _| {
            Err(PodError::Connection {
                message: "refused".into(),
            })
        });
        provider.expect_new_pod().never();

        let error = provision(&provider, &Config::default(), "a").expect_err("must fail");
        assert!(matches!(error, PodError::Connection { .. }));
    }

    #[test]
    fn no_pods_provider_reports_unavailable() {
        let error = provision(&NoPods, &Config::default(), "a").expect_err("must fail");
        assert_eq!(error, PodError::Unavailable);
    }
}
