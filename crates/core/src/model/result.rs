use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("correct answers ({correct}) exceed total questions ({total})")]
    CountMismatch { correct: u32, total: u32 },

    #[error("score {0} is outside 0..=100")]
    ScoreOutOfRange(f64),
}

/// Result summary returned by the server when a session is finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExamResult {
    correct_answers: u32,
    total_questions: u32,
    score: f64,
}

impl ExamResult {
    /// # Errors
    ///
    /// Returns `ResultError::CountMismatch` if `correct_answers > total_questions`
    /// and `ResultError::ScoreOutOfRange` for a non-percentage score.
    pub fn new(correct_answers: u32, total_questions: u32, score: f64) -> Result<Self, ResultError> {
        if correct_answers > total_questions {
            return Err(ResultError::CountMismatch {
                correct: correct_answers,
                total: total_questions,
            });
        }
        if !(0.0..=100.0).contains(&score) {
            return Err(ResultError::ScoreOutOfRange(score));
        }
        Ok(Self {
            correct_answers,
            total_questions,
            score,
        })
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    /// Percentage of correct answers as computed by the server.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_consistent_counts() {
        let result = ExamResult::new(1, 2, 50.0).unwrap();
        assert_eq!(result.correct_answers(), 1);
        assert_eq!(result.total_questions(), 2);
        assert!((result.score() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_more_correct_than_total() {
        let err = ExamResult::new(3, 2, 100.0).unwrap_err();
        assert_eq!(err, ResultError::CountMismatch { correct: 3, total: 2 });
    }

    #[test]
    fn rejects_score_outside_percentage() {
        assert!(ExamResult::new(0, 2, -1.0).is_err());
        assert!(ExamResult::new(2, 2, 100.5).is_err());
        assert!(ExamResult::new(0, 0, f64::NAN).is_err());
    }
}
