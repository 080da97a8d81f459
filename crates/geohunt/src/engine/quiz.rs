//! Quiz answer scoring.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::HuntTask;

/// Pass threshold in percent. Held a hair under 50 so a clean half score
/// (e.g. 2 of 4) passes despite float rounding.
pub const PASS_THRESHOLD_PERCENT: f64 = 49.9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub question_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizVerdict {
    pub correct_count: u32,
    pub wrong_count: u32,
    pub total_questions: u32,
    pub percentage: f64,
    pub is_pass: bool,
}

/// Score submitted answers against the task's stored question set. Matching is
/// exact and case-sensitive, keyed by question id; questions with no submitted
/// answer count wrong. `total_questions` is always the stored question count,
/// never the submission length. Pure: calling twice never mutates anything.
pub fn verify_quiz(task: &HuntTask, answers: &[QuizAnswer]) -> QuizVerdict {
    let answered: BTreeMap<&str, &str> = answers
        .iter()
        .map(|answer| (answer.question_id.as_str(), answer.answer.as_str()))
        .collect();
    let total_questions = task.questions.len() as u32;
    let correct_count = task
        .questions
        .iter()
        .filter(|question| answered.get(question.question_id.as_str()) == Some(&question.answer.as_str()))
        .count() as u32;
    let wrong_count = total_questions - correct_count;
    let percentage = if total_questions == 0 {
        0.0
    } else {
        f64::from(correct_count) / f64::from(total_questions) * 100.0
    };
    QuizVerdict {
        correct_count,
        wrong_count,
        total_questions,
        percentage,
        is_pass: percentage >= PASS_THRESHOLD_PERCENT,
    }
}
