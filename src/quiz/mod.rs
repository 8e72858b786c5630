//! Test definitions
//!
//! This module contains the authored test ([`config::Quiz`]), its questions
//! and the answers students give to them, along with the stored document
//! shapes read by teachers and students.

pub mod answer;
pub mod config;
pub mod question;

pub use answer::{Answer, Answers};
pub use config::{PublicTest, Quiz, TestRecord};
pub use question::{CorrectAnswer, PublicQuestion, Question, QuestionKind};
