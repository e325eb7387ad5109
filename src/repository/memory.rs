use async_std::sync::Mutex;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use std::collections::BTreeMap;

use super::{PollRepository, QuestionFilter};
use crate::error::{PollError, PollResult};
use crate::models::{Choice, ChoiceChange, NewChoice, NewQuestion, Question, ValidQuestion};

#[derive(Clone, Debug, Default)]
struct Tables {
    next_question_id: i64,
    next_choice_id: i64,
    questions: BTreeMap<i64, Question>,
    choices: BTreeMap<i64, Choice>,
}

impl Tables {
    fn insert_question(&mut self, question: &NewQuestion) -> Question {
        self.next_question_id += 1;
        let created = Question {
            id: self.next_question_id,
            question_text: question.question_text.clone(),
            pub_date: question.pub_date,
        };
        self.questions.insert(created.id, created.clone());
        created
    }

    fn insert_choice(&mut self, question_id: i64, choice: &NewChoice) -> Choice {
        self.next_choice_id += 1;
        let created = Choice {
            id: self.next_choice_id,
            question_id,
            choice_text: choice.choice_text.clone(),
            votes: choice.votes,
        };
        self.choices.insert(created.id, created.clone());
        created
    }

    fn choice_mut(&mut self, question_id: i64, choice_id: i64) -> PollResult<&mut Choice> {
        self.choices
            .get_mut(&choice_id)
            .filter(|c| c.question_id == question_id)
            .ok_or_else(|| PollError::unknown_choice(choice_id))
    }

    fn apply(&mut self, question_id: i64, change: &ChoiceChange) -> PollResult<()> {
        match change {
            ChoiceChange::Create(choice) => {
                self.insert_choice(question_id, choice);
            }
            ChoiceChange::Update(choice_id, choice) => {
                let existing = self.choice_mut(question_id, *choice_id)?;
                existing.choice_text = choice.choice_text.clone();
                existing.votes = choice.votes;
            }
            ChoiceChange::Delete(choice_id) => {
                self.choice_mut(question_id, *choice_id)?;
                self.choices.remove(choice_id);
            }
        }
        Ok(())
    }
}

/**
 * Process-local repository, used when no database is configured
 *
 * Nothing survives a restart. Every operation runs under a single lock so vote increments are never
 * lost.
 */
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(questions: &mut Vec<Question>) {
    questions.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl PollRepository for MemoryRepository {
    async fn latest_published(&self, now: DateTime<Utc>, limit: usize) -> PollResult<Vec<Question>> {
        let tables = self.tables.lock().await;
        let mut questions: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| q.pub_date <= now)
            .cloned()
            .collect();
        newest_first(&mut questions);
        questions.truncate(limit);
        Ok(questions)
    }

    async fn question(&self, id: i64) -> PollResult<Option<Question>> {
        Ok(self.tables.lock().await.questions.get(&id).cloned())
    }

    async fn choices(&self, question_id: i64) -> PollResult<Vec<Choice>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .choices
            .values()
            .filter(|c| c.question_id == question_id)
            .cloned()
            .collect())
    }

    async fn increment_votes(&self, question_id: i64, choice_id: i64) -> PollResult<Option<i32>> {
        let mut tables = self.tables.lock().await;
        match tables.choices.get_mut(&choice_id) {
            Some(choice) if choice.question_id == question_id => {
                choice.votes = choice.votes.checked_add(1).ok_or_else(PollError::tally_full)?;
                Ok(Some(choice.votes))
            }
            _ => Ok(None),
        }
    }

    async fn questions(&self, filter: &QuestionFilter) -> PollResult<Vec<Question>> {
        let tables = self.tables.lock().await;
        let mut questions: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| filter.matches(q))
            .cloned()
            .collect();
        newest_first(&mut questions);
        Ok(questions)
    }

    async fn insert_question(&self, question: &NewQuestion) -> PollResult<Question> {
        Ok(self.tables.lock().await.insert_question(question))
    }

    async fn insert_choice(&self, question_id: i64, choice: &NewChoice) -> PollResult<Choice> {
        Ok(self.tables.lock().await.insert_choice(question_id, choice))
    }

    async fn save_question(&self, id: Option<i64>, valid: &ValidQuestion) -> PollResult<Question> {
        let mut tables = self.tables.lock().await;
        // work on a copy, the live tables are only replaced once every change has applied
        let mut draft = tables.clone();

        let question = match id {
            Some(id) => {
                let existing = draft.questions.get_mut(&id).ok_or(PollError::NotFound)?;
                existing.question_text = valid.question.question_text.clone();
                existing.pub_date = valid.question.pub_date;
                existing.clone()
            }
            None => draft.insert_question(&valid.question),
        };
        for change in valid.choices.iter() {
            draft.apply(question.id, change)?;
        }

        *tables = draft;
        Ok(question)
    }

    async fn delete_question(&self, id: i64) -> PollResult<bool> {
        let mut tables = self.tables.lock().await;
        if tables.questions.remove(&id).is_none() {
            return Ok(false);
        }
        tables.choices.retain(|_, c| c.question_id != id);
        Ok(true)
    }
}
