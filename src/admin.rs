/*!
 * Management of questions and their inline choices
 *
 * Forms are kept as raw strings until validated so that a rejected submission can be shown back
 * to the user exactly as it was typed.
 */
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::error::{PollError, PollResult};
use crate::models::{ChoiceChange, NewChoice, NewQuestion, Poll, Question, ValidQuestion};
use crate::repository::{DateFilter, PollRepository, QuestionFilter};

/// Blank choice rows offered below the existing ones
pub const EXTRA_CHOICES: usize = 3;

pub const MAX_TEXT_LEN: usize = 200;

pub const UNREADABLE_FORM: &str = "The submitted form could not be read.";

const FORM_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const ACCEPTED_DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/**
 * Query string of the question list: `?q=text&pub_date=today`
 */
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
}

impl ListQuery {
    pub fn date_filter(&self) -> Option<DateFilter> {
        self.pub_date.as_deref().and_then(DateFilter::parse)
    }

    pub fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    pub fn filter(&self, now: DateTime<Utc>) -> QuestionFilter {
        QuestionFilter {
            search: self.search().map(str::to_string),
            published: self.date_filter().map(|f| f.range(now)),
        }
    }
}

/**
 * One row of the question list
 */
#[derive(Debug, Serialize)]
pub struct QuestionRow {
    #[serde(flatten)]
    pub question: Question,
    pub was_published_recently: bool,
}

pub async fn list(
    repo: &dyn PollRepository,
    query: &ListQuery,
    now: DateTime<Utc>,
) -> PollResult<Vec<QuestionRow>> {
    let questions = repo.questions(&query.filter(now)).await?;
    Ok(questions
        .into_iter()
        .map(|question| QuestionRow {
            was_published_recently: question.was_published_recently(now),
            question,
        })
        .collect())
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ChoiceRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choice_text: String,
    #[serde(default)]
    pub votes: String,
    #[serde(default)]
    pub delete: Option<String>,
}

impl ChoiceRow {
    fn id(&self) -> Result<Option<i64>, ()> {
        match self.id.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| ()),
        }
    }

    fn is_blank(&self) -> bool {
        self.choice_text.trim().is_empty() && self.votes.trim().is_empty()
    }

    fn is_deleted(&self) -> bool {
        self.delete.is_some()
    }
}

/**
 * The question form with its inline choice rows, as submitted
 */
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct QuestionForm {
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub pub_date: String,
    #[serde(default)]
    pub choices: Vec<ChoiceRow>,
}

impl QuestionForm {
    /**
     * An empty form as shown by "add question"
     */
    pub fn blank() -> Self {
        Self::default().with_extra_rows()
    }

    pub fn from_poll(poll: &Poll) -> Self {
        Self {
            question_text: poll.question.question_text.clone(),
            pub_date: poll.question.pub_date.format(FORM_DATE_FORMAT).to_string(),
            choices: poll
                .choices
                .iter()
                .map(|c| ChoiceRow {
                    id: Some(c.id.to_string()),
                    choice_text: c.choice_text.clone(),
                    votes: c.votes.to_string(),
                    delete: None,
                })
                .collect(),
        }
        .with_extra_rows()
    }

    pub fn with_extra_rows(mut self) -> Self {
        for _ in 0..EXTRA_CHOICES {
            self.choices.push(ChoiceRow::default());
        }
        self
    }

    pub fn parse(body: &str) -> Result<Self, String> {
        /*
         * Browsers percent-encode the brackets of `choices[0][choice_text]`, which the strict
         * parser refuses
         */
        serde_qs::Config::new(5, false)
            .deserialize_str(body)
            .map_err(|err| {
                warn!("Unreadable question form: {:?}", err);
                UNREADABLE_FORM.to_string()
            })
    }

    /**
     * Check the submission, collecting every problem rather than stopping at the first
     */
    pub fn validate(&self) -> Result<ValidQuestion, Vec<String>> {
        let mut errors = vec![];

        let question_text = self.question_text.trim();
        if question_text.is_empty() {
            errors.push("Question text is required.".to_string());
        } else if question_text.chars().count() > MAX_TEXT_LEN {
            errors.push(format!(
                "Question text must be at most {} characters.",
                MAX_TEXT_LEN
            ));
        }

        let pub_date = parse_pub_date(&self.pub_date);
        if pub_date.is_none() {
            errors.push("Enter a valid date and time for the publication date.".to_string());
        }

        let mut choices = vec![];
        for (index, row) in self.choices.iter().enumerate() {
            let number = index + 1;
            let id = match row.id() {
                Ok(id) => id,
                Err(_) => {
                    errors.push(format!("Choice {} has an invalid id.", number));
                    continue;
                }
            };

            match id {
                Some(id) if row.is_deleted() => {
                    choices.push(ChoiceChange::Delete(id));
                    continue;
                }
                None if row.is_deleted() || row.is_blank() => continue,
                _ => {}
            }

            let choice_text = row.choice_text.trim();
            if choice_text.is_empty() {
                errors.push(format!("Choice {} needs some text.", number));
                continue;
            }
            if choice_text.chars().count() > MAX_TEXT_LEN {
                errors.push(format!(
                    "Choice {} must be at most {} characters.",
                    number, MAX_TEXT_LEN
                ));
                continue;
            }

            let votes = match row.votes.trim() {
                "" => 0,
                raw => match raw.parse::<i32>() {
                    Ok(votes) if votes >= 0 => votes,
                    _ => {
                        errors.push(format!(
                            "Choice {} votes must be a whole number, zero or more.",
                            number
                        ));
                        continue;
                    }
                },
            };

            let choice = NewChoice {
                choice_text: choice_text.to_string(),
                votes,
            };
            choices.push(match id {
                Some(id) => ChoiceChange::Update(id, choice),
                None => ChoiceChange::Create(choice),
            });
        }

        match pub_date {
            Some(pub_date) if errors.is_empty() => Ok(ValidQuestion {
                question: NewQuestion {
                    question_text: question_text.to_string(),
                    pub_date,
                },
                choices,
            }),
            _ => Err(errors),
        }
    }
}

/**
 * Dates come from a `datetime-local` input and are taken to be UTC
 */
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    ACCEPTED_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/**
 * Persist a validated form, creating the question when `id` is `None`
 */
pub async fn save(
    repo: &dyn PollRepository,
    id: Option<i64>,
    valid: &ValidQuestion,
) -> PollResult<Question> {
    let question = repo.save_question(id, valid).await?;
    info!("Saved question {}", question.id);
    Ok(question)
}

pub async fn delete(repo: &dyn PollRepository, id: i64) -> PollResult<()> {
    if repo.delete_question(id).await? {
        info!("Deleted question {}", id);
        Ok(())
    } else {
        Err(PollError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc.ymd(2020, 10, 1).and_hms(12, 0, 0)
    }

    fn row(text: &str) -> ChoiceRow {
        ChoiceRow {
            choice_text: text.to_string(),
            ..ChoiceRow::default()
        }
    }

    fn form(text: &str, pub_date: &str, choices: Vec<ChoiceRow>) -> QuestionForm {
        QuestionForm {
            question_text: text.to_string(),
            pub_date: pub_date.to_string(),
            choices,
        }
    }

    #[test]
    fn parses_browser_encoded_form() {
        let body = "question_text=What%27s+up%3F&pub_date=2020-10-01T12%3A30\
            &choices%5B0%5D%5Bchoice_text%5D=Not+much&choices%5B0%5D%5Bvotes%5D=2\
            &choices%5B1%5D%5Bchoice_text%5D=The+sky";
        let parsed = QuestionForm::parse(body).unwrap();
        assert_eq!(parsed.question_text, "What's up?");
        assert_eq!(parsed.pub_date, "2020-10-01T12:30");
        assert_eq!(parsed.choices.len(), 2);
        assert_eq!(parsed.choices[0].choice_text, "Not much");
        assert_eq!(parsed.choices[0].votes, "2");
        assert_eq!(parsed.choices[1].choice_text, "The sky");
    }

    #[test]
    fn unreadable_form_is_reported() {
        let body = "question_text%5Bnested%5D=oops&pub_date=2020-10-01T12%3A30";
        assert_eq!(QuestionForm::parse(body), Err(UNREADABLE_FORM.to_string()));
    }

    #[test]
    fn accepts_dates_with_or_without_seconds() {
        let expected = Utc.ymd(2020, 10, 1).and_hms(12, 30, 0);
        assert_eq!(parse_pub_date("2020-10-01T12:30"), Some(expected));
        assert_eq!(parse_pub_date("2020-10-01T12:30:00"), Some(expected));
        assert_eq!(parse_pub_date("2020-10-01 12:30"), Some(expected));
        assert_eq!(parse_pub_date("yesterday"), None);
    }

    #[test]
    fn blank_rows_are_ignored() {
        let valid = form("Q", "2020-10-01T12:30", vec![row("A"), row(""), row("  ")])
            .validate()
            .unwrap();
        assert_eq!(valid.choices, vec![ChoiceChange::Create(NewChoice::new("A"))]);
    }

    #[test]
    fn collects_every_error() {
        let mut bad_votes = row("B");
        bad_votes.votes = "-1".to_string();
        let errors = form("", "never", vec![bad_votes]).validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("Question text"));
        assert!(errors[1].contains("publication date"));
        assert!(errors[2].contains("Choice 1"));
    }

    #[test]
    fn rejects_overlong_text() {
        let long = "x".repeat(MAX_TEXT_LEN + 1);
        let errors = form(&long, "2020-10-01T12:30", vec![row(&long)])
            .validate()
            .unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn existing_rows_update_or_delete() {
        let mut kept = row("A");
        kept.id = Some("4".to_string());
        kept.votes = "7".to_string();
        let mut dropped = row("B");
        dropped.id = Some("5".to_string());
        dropped.delete = Some("on".to_string());

        let valid = form("Q", "2020-10-01T12:30", vec![kept, dropped])
            .validate()
            .unwrap();
        assert_eq!(
            valid.choices,
            vec![
                ChoiceChange::Update(
                    4,
                    NewChoice {
                        choice_text: "A".to_string(),
                        votes: 7
                    }
                ),
                ChoiceChange::Delete(5),
            ]
        );
    }

    #[test]
    fn form_from_poll_round_trips_through_validation() {
        let poll = Poll {
            question: Question {
                id: 3,
                question_text: "Q".to_string(),
                pub_date: now(),
            },
            choices: vec![crate::models::Choice {
                id: 9,
                question_id: 3,
                choice_text: "A".to_string(),
                votes: 2,
            }],
        };
        let form = QuestionForm::from_poll(&poll);
        assert_eq!(form.choices.len(), 1 + EXTRA_CHOICES);

        let valid = form.validate().unwrap();
        assert_eq!(valid.question.pub_date, now());
        assert_eq!(
            valid.choices,
            vec![ChoiceChange::Update(
                9,
                NewChoice {
                    choice_text: "A".to_string(),
                    votes: 2
                }
            )]
        );
    }

    #[async_std::test]
    async fn save_creates_then_edits() {
        let repo = MemoryRepository::new();
        let valid = form("Q", "2020-10-01T12:00", vec![row("A"), row("B")])
            .validate()
            .unwrap();
        let created = save(&repo, None, &valid).await.unwrap();
        let choices = repo.choices(created.id).await.unwrap();
        assert_eq!(choices.len(), 2);

        let mut rename = row("A2");
        rename.id = Some(choices[0].id.to_string());
        let mut remove = row("B");
        remove.id = Some(choices[1].id.to_string());
        remove.delete = Some("on".to_string());
        let valid = form("Q2", "2020-10-01T13:00", vec![rename, remove, row("C")])
            .validate()
            .unwrap();
        save(&repo, Some(created.id), &valid).await.unwrap();

        let question = repo.question(created.id).await.unwrap().unwrap();
        assert_eq!(question.question_text, "Q2");
        let texts: Vec<String> = repo
            .choices(created.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.choice_text)
            .collect();
        assert_eq!(texts, vec!["A2", "C"]);
    }

    #[async_std::test]
    async fn save_with_a_foreign_choice_changes_nothing() {
        let repo = MemoryRepository::new();
        let valid = form("Q", "2020-10-01T12:00", vec![row("A")]).validate().unwrap();
        let mine = save(&repo, None, &valid).await.unwrap();
        let theirs = save(&repo, None, &valid).await.unwrap();
        let foreign = repo.choices(theirs.id).await.unwrap()[0].clone();

        let mut stolen = row("stolen");
        stolen.id = Some(foreign.id.to_string());
        let valid = form("Q edited", "2020-10-01T13:00", vec![row("B"), stolen])
            .validate()
            .unwrap();
        match save(&repo, Some(mine.id), &valid).await {
            Err(PollError::Validation(msg)) => {
                assert_eq!(msg, format!("Choice {} is not part of this question.", foreign.id))
            }
            other => panic!("expected Validation, got {:?}", other),
        }

        assert_eq!(repo.question(mine.id).await.unwrap(), Some(mine.clone()));
        assert_eq!(repo.choices(mine.id).await.unwrap().len(), 1);
        assert_eq!(repo.choices(theirs.id).await.unwrap(), vec![foreign]);
    }

    #[async_std::test]
    async fn save_unknown_question_is_not_found() {
        let repo = MemoryRepository::new();
        let valid = form("Q", "2020-10-01T12:00", vec![]).validate().unwrap();
        match save(&repo, Some(99), &valid).await {
            Err(PollError::NotFound) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
        match delete(&repo, 99).await {
            Err(PollError::NotFound) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[async_std::test]
    async fn list_filters_and_flags_recent_questions() {
        let repo = MemoryRepository::new();
        for (text, offset) in &[
            ("What's new?", Duration::hours(-2)),
            ("What's old?", Duration::days(-40)),
            ("Who's next?", Duration::hours(-3)),
        ] {
            repo.insert_question(&NewQuestion {
                question_text: text.to_string(),
                pub_date: now() + *offset,
            })
            .await
            .unwrap();
        }

        let query = ListQuery {
            q: Some("what".to_string()),
            pub_date: None,
        };
        let rows = list(&repo, &query, now()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].was_published_recently);
        assert!(!rows[1].was_published_recently);

        let query = ListQuery {
            q: None,
            pub_date: Some("today".to_string()),
        };
        let rows = list(&repo, &query, now()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].question.question_text, "What's new?");
    }
}
