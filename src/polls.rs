use log::*;

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{PollError, PollResult};
use crate::models::{Choice, Poll, Question};
use crate::repository::PollRepository;

/// How many questions the index page shows
pub const LATEST_LIMIT: usize = 5;

pub const NO_CHOICE_SELECTED: &str = "You didn't select a choice!";

/**
 * The public polling operations: listing, detail/results and voting
 */
#[derive(Clone)]
pub struct PollService {
    repo: Arc<dyn PollRepository>,
    clock: Arc<dyn Clock>,
}

impl PollService {
    pub fn new(repo: Arc<dyn PollRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub fn repo(&self) -> &dyn PollRepository {
        self.repo.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /**
     * The most recently published questions, never including those scheduled for the future
     */
    pub async fn latest(&self) -> PollResult<Vec<Question>> {
        self.repo
            .latest_published(self.clock.now(), LATEST_LIMIT)
            .await
    }

    /**
     * Look up a question with its choices, used by both the detail and results pages
     */
    pub async fn poll(&self, question_id: i64) -> PollResult<Poll> {
        let question = self
            .repo
            .question(question_id)
            .await?
            .ok_or(PollError::NotFound)?;
        let choices = self.repo.choices(question_id).await?;
        Ok(Poll { question, choices })
    }

    /**
     * Record one vote for the submitted choice.
     *
     * `selected` is the raw `choice` form value. Anything that does not name a choice of this
     * question is a validation error and leaves every tally untouched.
     */
    pub async fn vote(&self, question_id: i64, selected: Option<&str>) -> PollResult<Choice> {
        let poll = self.poll(question_id).await?;

        let choice = selected
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(|id| poll.choices.iter().find(|c| c.id == id))
            .ok_or_else(|| PollError::Validation(NO_CHOICE_SELECTED.to_string()))?;

        let votes = match self.repo.increment_votes(question_id, choice.id).await? {
            Some(votes) => votes,
            // the choice vanished between the lookup and the update
            None => return Err(PollError::Validation(NO_CHOICE_SELECTED.to_string())),
        };

        info!("Vote recorded for choice {} of question {}", choice.id, question_id);
        Ok(Choice {
            votes,
            ..choice.clone()
        })
    }
}
