use super::item::{Decision, ItemStatus};

#[derive(thiserror::Error, Debug)]
pub enum ApprovalError {
    #[error("no live approval item with id {0}")]
    NotFound(String),
    #[error("a note is required to mark an item {0}")]
    NoteRequired(Decision),
    #[error("item {id} is {from:?} and cannot be {attempted}")]
    InvalidTransition {
        id: String,
        from: ItemStatus,
        attempted: String,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum DraftError {
    #[error("submission draft is missing its {0}")]
    MissingField(&'static str),
    #[error("submission draft {0} must not be empty")]
    EmptyField(&'static str),
}
