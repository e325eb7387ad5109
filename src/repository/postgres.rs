use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{PollRepository, QuestionFilter};
use crate::error::{PollError, PollResult};
use crate::models::{Choice, ChoiceChange, NewChoice, NewQuestion, Question, ValidQuestion};

/// SQLSTATE `numeric_value_out_of_range`
const OUT_OF_RANGE: &str = "22003";

/**
 * Repository backed by the `questions` and `choices` tables in PostgreSQL
 */
#[derive(Clone, Debug)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /**
     * Create the sqlx connection pool and bring the schema up to date
     */
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        debug!("Running migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl PollRepository for PgRepository {
    async fn latest_published(&self, now: DateTime<Utc>, limit: usize) -> PollResult<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(
            "SELECT id, question_text, pub_date FROM questions
                WHERE pub_date <= $1 ORDER BY pub_date DESC, id DESC LIMIT $2",
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    async fn question(&self, id: i64) -> PollResult<Option<Question>> {
        let question = sqlx::query_as::<_, Question>(
            "SELECT id, question_text, pub_date FROM questions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(question)
    }

    async fn choices(&self, question_id: i64) -> PollResult<Vec<Choice>> {
        let choices = sqlx::query_as::<_, Choice>(
            "SELECT id, question_id, choice_text, votes FROM choices
                WHERE question_id = $1 ORDER BY id ASC",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(choices)
    }

    async fn increment_votes(&self, question_id: i64, choice_id: i64) -> PollResult<Option<i32>> {
        /*
         * The increment happens inside the UPDATE so concurrent votes on the same choice serialize
         * on the row lock rather than overwrite each other
         */
        let votes = sqlx::query_as::<_, (i32,)>(
            "UPDATE choices SET votes = votes + 1 WHERE id = $1 AND question_id = $2
                RETURNING votes",
        )
        .bind(choice_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(tally_error)?;
        Ok(votes.map(|(votes,)| votes))
    }

    async fn questions(&self, filter: &QuestionFilter) -> PollResult<Vec<Question>> {
        let search = filter
            .search
            .as_ref()
            .map(|s| format!("%{}%", escape_like(s)));
        let (start, end) = match filter.published {
            Some((start, end)) => (Some(start), Some(end)),
            None => (None, None),
        };

        let questions = sqlx::query_as::<_, Question>(
            "SELECT id, question_text, pub_date FROM questions
                WHERE ($1::TEXT IS NULL OR question_text ILIKE $1)
                  AND ($2::TIMESTAMPTZ IS NULL OR pub_date >= $2)
                  AND ($3::TIMESTAMPTZ IS NULL OR pub_date < $3)
                ORDER BY pub_date DESC, id DESC",
        )
        .bind(search)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    async fn insert_question(&self, question: &NewQuestion) -> PollResult<Question> {
        let created = sqlx::query_as::<_, Question>(
            "INSERT INTO questions (question_text, pub_date) VALUES ($1, $2)
                RETURNING id, question_text, pub_date",
        )
        .bind(&question.question_text)
        .bind(question.pub_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn insert_choice(&self, question_id: i64, choice: &NewChoice) -> PollResult<Choice> {
        let created = sqlx::query_as::<_, Choice>(
            "INSERT INTO choices (question_id, choice_text, votes) VALUES ($1, $2, $3)
                RETURNING id, question_id, choice_text, votes",
        )
        .bind(question_id)
        .bind(&choice.choice_text)
        .bind(choice.votes)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn save_question(&self, id: Option<i64>, valid: &ValidQuestion) -> PollResult<Question> {
        // returning early drops the transaction, which rolls back everything written so far
        let mut tx = self.pool.begin().await?;

        let question = match id {
            Some(id) => sqlx::query_as::<_, Question>(
                "UPDATE questions SET question_text = $1, pub_date = $2 WHERE id = $3
                    RETURNING id, question_text, pub_date",
            )
            .bind(&valid.question.question_text)
            .bind(valid.question.pub_date)
            .bind(id)
            .fetch_optional(&mut tx)
            .await?
            .ok_or(PollError::NotFound)?,
            None => sqlx::query_as::<_, Question>(
                "INSERT INTO questions (question_text, pub_date) VALUES ($1, $2)
                    RETURNING id, question_text, pub_date",
            )
            .bind(&valid.question.question_text)
            .bind(valid.question.pub_date)
            .fetch_one(&mut tx)
            .await?,
        };

        for change in valid.choices.iter() {
            match change {
                ChoiceChange::Create(choice) => {
                    sqlx::query(
                        "INSERT INTO choices (question_id, choice_text, votes) VALUES ($1, $2, $3)",
                    )
                    .bind(question.id)
                    .bind(&choice.choice_text)
                    .bind(choice.votes)
                    .execute(&mut tx)
                    .await?;
                }
                ChoiceChange::Update(choice_id, choice) => {
                    let res = sqlx::query(
                        "UPDATE choices SET choice_text = $1, votes = $2
                            WHERE id = $3 AND question_id = $4",
                    )
                    .bind(&choice.choice_text)
                    .bind(choice.votes)
                    .bind(*choice_id)
                    .bind(question.id)
                    .execute(&mut tx)
                    .await?;
                    if res.rows_affected() != 1 {
                        return Err(PollError::unknown_choice(*choice_id));
                    }
                }
                ChoiceChange::Delete(choice_id) => {
                    let res = sqlx::query("DELETE FROM choices WHERE id = $1 AND question_id = $2")
                        .bind(*choice_id)
                        .bind(question.id)
                        .execute(&mut tx)
                        .await?;
                    if res.rows_affected() != 1 {
                        return Err(PollError::unknown_choice(*choice_id));
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(question)
    }

    async fn delete_question(&self, id: i64) -> PollResult<bool> {
        // choices go with it through ON DELETE CASCADE
        let res = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }
}

/**
 * A vote that would push the tally past what an INTEGER holds is refused by PostgreSQL
 */
fn tally_error(err: sqlx::Error) -> PollError {
    let overflow = matches!(
        &err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(OUT_OF_RANGE)
    );
    if overflow {
        PollError::tally_full()
    } else {
        PollError::Storage(err)
    }
}

/**
 * Make user input safe to embed in an ILIKE pattern
 */
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
