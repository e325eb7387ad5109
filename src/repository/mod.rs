use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use crate::error::PollResult;
use crate::models::{Choice, NewChoice, NewQuestion, Question, ValidQuestion};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

/**
 * Storage for questions and their choices
 *
 * Lookups of missing rows return `None` or `false`, it is up to the caller to decide whether that
 * is a NotFound condition.
 */
#[async_trait]
pub trait PollRepository: Send + Sync + 'static {
    /**
     * The latest `limit` questions published at or before `now`, newest first
     */
    async fn latest_published(&self, now: DateTime<Utc>, limit: usize) -> PollResult<Vec<Question>>;

    async fn question(&self, id: i64) -> PollResult<Option<Question>>;

    /**
     * All choices of a question ordered by id
     */
    async fn choices(&self, question_id: i64) -> PollResult<Vec<Choice>>;

    /**
     * Atomically add one vote to the choice, provided it belongs to the question.
     *
     * Returns the new tally, or `None` when no such choice exists under that question. A tally
     * that cannot grow any further is rejected and left as it was.
     */
    async fn increment_votes(&self, question_id: i64, choice_id: i64) -> PollResult<Option<i32>>;

    /**
     * Questions matching the filter, newest first
     */
    async fn questions(&self, filter: &QuestionFilter) -> PollResult<Vec<Question>>;

    async fn insert_question(&self, question: &NewQuestion) -> PollResult<Question>;

    async fn insert_choice(&self, question_id: i64, choice: &NewChoice) -> PollResult<Choice>;

    /**
     * Write a question and every one of its choice changes as a single unit, creating the
     * question when `id` is `None`.
     *
     * Either all of it lands or none of it does. An unknown question is `NotFound`, and a choice
     * change naming a choice outside the question fails the whole save.
     */
    async fn save_question(&self, id: Option<i64>, valid: &ValidQuestion) -> PollResult<Question>;

    /**
     * Remove the question along with all of its choices
     */
    async fn delete_question(&self, id: i64) -> PollResult<bool>;
}

/**
 * Publication date buckets offered by the admin question list
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateFilter {
    Today,
    PastSevenDays,
    ThisMonth,
    ThisYear,
}

impl DateFilter {
    pub const ALL: [DateFilter; 4] = [
        DateFilter::Today,
        DateFilter::PastSevenDays,
        DateFilter::ThisMonth,
        DateFilter::ThisYear,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "today" => Some(DateFilter::Today),
            "past_7_days" => Some(DateFilter::PastSevenDays),
            "this_month" => Some(DateFilter::ThisMonth),
            "this_year" => Some(DateFilter::ThisYear),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            DateFilter::Today => "today",
            DateFilter::PastSevenDays => "past_7_days",
            DateFilter::ThisMonth => "this_month",
            DateFilter::ThisYear => "this_year",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DateFilter::Today => "Today",
            DateFilter::PastSevenDays => "Past 7 days",
            DateFilter::ThisMonth => "This month",
            DateFilter::ThisYear => "This year",
        }
    }

    /**
     * Half-open `[start, end)` range this bucket covers relative to `now`
     */
    pub fn range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let today = now.naive_utc().date();
        let tomorrow = today + Duration::days(1);

        let (start, end) = match self {
            DateFilter::Today => (today, tomorrow),
            DateFilter::PastSevenDays => (today - Duration::days(7), tomorrow),
            DateFilter::ThisMonth => {
                let first = first_of_month(today.year(), today.month());
                let next = if today.month() == 12 {
                    first_of_month(today.year() + 1, 1)
                } else {
                    first_of_month(today.year(), today.month() + 1)
                };
                (first, next)
            }
            DateFilter::ThisYear => (
                first_of_month(today.year(), 1),
                first_of_month(today.year() + 1, 1),
            ),
        };
        (midnight(start), midnight(end))
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd(year, month, 1)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms(0, 0, 0))
}

/**
 * Criteria for the admin question list
 */
#[derive(Clone, Debug, Default)]
pub struct QuestionFilter {
    /// Case-insensitive substring of the question text
    pub search: Option<String>,
    /// Only questions with `start <= pub_date < end`
    pub published: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl QuestionFilter {
    pub fn matches(&self, question: &Question) -> bool {
        if let Some(search) = &self.search {
            if !question
                .question_text
                .to_lowercase()
                .contains(&search.to_lowercase())
            {
                return false;
            }
        }
        if let Some((start, end)) = self.published {
            if question.pub_date < start || question.pub_date >= end {
                return false;
            }
        }
        true
    }
}
