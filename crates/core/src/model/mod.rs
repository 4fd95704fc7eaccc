mod checkpoint;
mod ids;
mod question;
mod result;

pub use checkpoint::{CheckpointError, SessionCheckpoint};
pub use ids::{OptionId, ParseIdError, QuestionId, SessionId, TestId};
pub use question::{Answer, AnswerOption, Question, QuestionError};
pub use result::{ExamResult, ResultError};
pub use test::{TestDefinition, TestListing, TestStatus};
