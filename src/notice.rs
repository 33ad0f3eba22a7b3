//! View and notification boundary.

use crate::error::DomainError;
use crate::tree::Catalog;
use crate::validator::MoveRejection;

/// User-facing message emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A drop was refused; nothing changed
    Rejected(MoveRejection),
    /// The store refused a move; the tree was reverted
    SaveFailed { message: Option<String> },
}

impl Notice {
    /// Build from a store error, keeping the server message when there is one
    pub fn save_failed(error: &DomainError) -> Self {
        let message = error.message().trim();
        Notice::SaveFailed {
            message: (!message.is_empty()).then(|| message.to_string()),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Rejected(rejection) => write!(f, "{}", rejection),
            Notice::SaveFailed { message: Some(msg) } => {
                write!(f, "could not save, reverted: {}", msg)
            }
            Notice::SaveFailed { message: None } => f.write_str("could not save, reverted"),
        }
    }
}

/// Receives tree replacements and notices from the engine
pub trait MoveListener {
    /// The live tree was replaced (optimistic move or rollback)
    fn catalog_changed(&self, catalog: &Catalog);

    fn notify(&self, notice: &Notice);
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl MoveListener for NoopListener {
    fn catalog_changed(&self, _catalog: &Catalog) {}

    fn notify(&self, _notice: &Notice) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_failed_message() {
        let notice = Notice::save_failed(&DomainError::Internal("timeout".to_string()));
        assert_eq!(notice.to_string(), "could not save, reverted: timeout");

        let notice = Notice::save_failed(&DomainError::Internal(String::new()));
        assert_eq!(notice.to_string(), "could not save, reverted");
    }
}
