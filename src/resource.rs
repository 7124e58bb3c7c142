//! The seam between the manager and whatever it manages.

use crate::error::{BoxError, TeardownError};

/// An expensive, exclusively owned instance (typically a model holding device memory).
pub trait Resource: Send + Sync + 'static {
    /// Return device memory and other external state before the instance is dropped.
    ///
    /// Called exactly once, after every handle to the instance is gone.
    fn teardown(&mut self) -> Result<(), TeardownError> {
        Ok(())
    }
}

/// Builds a [`Resource`] for a key (e.g. a model directory).
///
/// Report failures through `Err`. A panic unwinds through
/// [`ResourceManager::acquire`](crate::ResourceManager::acquire) and leaves the
/// slot empty; only the tool layer turns it into an error response.
pub trait ResourceLoader: Send + Sync {
    type Resource: Resource;

    fn load(&self, key: &str) -> Result<Self::Resource, BoxError>;
}

impl<F, R, E> ResourceLoader for F
where
    F: Fn(&str) -> Result<R, E> + Send + Sync,
    R: Resource,
    E: Into<BoxError>,
{
    type Resource = R;

    fn load(&self, key: &str) -> Result<R, BoxError> {
        self(key).map_err(Into::into)
    }
}
