use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/**
 * A poll prompt, published at `pub_date`
 */
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Question {
    pub id: i64,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
}

impl Question {
    /**
     * True when the question went out within the last day and is not scheduled for the future
     */
    pub fn was_published_recently(&self, now: DateTime<Utc>) -> bool {
        now - Duration::days(1) <= self.pub_date && self.pub_date <= now
    }
}

/**
 * One selectable answer under a question, with its vote tally
 */
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    pub choice_text: String,
    pub votes: i32,
}

/**
 * Fields needed to create or overwrite a question
 */
#[derive(Clone, Debug, PartialEq)]
pub struct NewQuestion {
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
}

/**
 * Fields needed to create or overwrite a choice
 */
#[derive(Clone, Debug, PartialEq)]
pub struct NewChoice {
    pub choice_text: String,
    pub votes: i32,
}

#[cfg(test)]
impl NewChoice {
    pub fn new(choice_text: &str) -> Self {
        Self {
            choice_text: choice_text.to_string(),
            votes: 0,
        }
    }
}

/**
 * A question together with all of its choices, ordered by id
 */
#[derive(Clone, Debug, Serialize)]
pub struct Poll {
    pub question: Question,
    pub choices: Vec<Choice>,
}

/**
 * What to do with one choice row once the admin form has been accepted
 */
#[derive(Clone, Debug, PartialEq)]
pub enum ChoiceChange {
    Create(NewChoice),
    Update(i64, NewChoice),
    Delete(i64),
}

/**
 * A validated question with the choice changes to apply alongside it
 */
#[derive(Clone, Debug, PartialEq)]
pub struct ValidQuestion {
    pub question: NewQuestion,
    pub choices: Vec<ChoiceChange>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn question_at(pub_date: DateTime<Utc>) -> Question {
        Question {
            id: 1,
            question_text: "What's new?".to_string(),
            pub_date,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.ymd(2020, 10, 1).and_hms(12, 0, 0)
    }

    #[test]
    fn future_question_is_not_recent() {
        let q = question_at(now() + Duration::days(30));
        assert!(!q.was_published_recently(now()));
    }

    #[test]
    fn old_question_is_not_recent() {
        let q = question_at(now() - Duration::days(1) - Duration::seconds(1));
        assert!(!q.was_published_recently(now()));
    }

    #[test]
    fn question_within_the_last_day_is_recent() {
        let q = question_at(now() - Duration::hours(23) - Duration::minutes(59));
        assert!(q.was_published_recently(now()));
        assert!(question_at(now()).was_published_recently(now()));
    }

    #[test]
    fn exactly_one_day_old_is_recent() {
        let q = question_at(now() - Duration::days(1));
        assert!(q.was_published_recently(now()));
    }
}
