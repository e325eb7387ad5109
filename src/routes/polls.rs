use log::*;
use serde::Deserialize;
use serde_json::json;
use tide::{Redirect, Request};

use crate::error::{http_error, PollError};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
struct VoteForm {
    choice: Option<String>,
}

/**
 *  GET /
 */
pub async fn index(req: Request<AppState>) -> tide::Result {
    let questions = req.state().polls.latest().await.map_err(http_error)?;
    req.state()
        .views
        .page("index", &json!({ "questions": questions }))
}

/**
 *  GET /:id/
 */
pub async fn detail(req: Request<AppState>) -> tide::Result {
    let id = super::question_id(&req)?;
    let poll = req.state().polls.poll(id).await.map_err(http_error)?;
    req.state().views.page("detail", &poll)
}

/**
 *  GET /:id/results
 */
pub async fn results(req: Request<AppState>) -> tide::Result {
    let id = super::question_id(&req)?;
    let poll = req.state().polls.poll(id).await.map_err(http_error)?;
    req.state().views.page("results", &poll)
}

/**
 *  POST /:id/vote/
 *
 * Redirects to the results on success so that reloading the page cannot vote twice
 */
pub async fn vote(mut req: Request<AppState>) -> tide::Result {
    let id = super::question_id(&req)?;
    let body = req.body_string().await?;
    let form: VoteForm = serde_qs::from_str(&body).unwrap_or_else(|err| {
        debug!("Unreadable vote form {:?}: {:?}", body, err);
        VoteForm::default()
    });

    let state = req.state();
    match state.polls.vote(id, form.choice.as_deref()).await {
        Ok(_) => Ok(Redirect::see_other(format!("/{}/results", id)).into()),
        Err(PollError::Validation(message)) => {
            let poll = state.polls.poll(id).await.map_err(http_error)?;
            state.views.page(
                "detail",
                &json!({
                    "question": poll.question,
                    "choices": poll.choices,
                    "error_message": message,
                }),
            )
        }
        Err(err) => Err(http_error(err)),
    }
}
