pub mod quiz;
pub mod session;

pub use quiz::{QuestionRef, QuestionSet, Quiz, QuizMetadata, TimeLimit};
pub use session::{
    CreateSessionRequest, EventType, Session, SessionAnswer, SessionEvent, UpdateSessionAnswer,
    UpdateSessionRequest, UpdateSessionResponse,
};
