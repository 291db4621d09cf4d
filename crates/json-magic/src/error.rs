use thiserror::Error;

use crate::bundle::BundleError;
use crate::diff::DiffError;
use crate::document::DocumentError;
use crate::migrate::MigrationError;
use crate::reference::ResolveError;
use crate::workspace::WorkspaceError;
use json_magic_pointer::JsonPointerError;

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Pointer(#[from] JsonPointerError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

pub type Result<T> = std::result::Result<T, Error>;
