use serde_json::json;
use tide::{Redirect, Request, Response, StatusCode};

use crate::admin::{self, ListQuery, QuestionForm};
use crate::error::{http_error, PollError};
use crate::repository::DateFilter;
use crate::AppState;

const LIST_PATH: &str = "/admin/questions";

/**
 * Link to the question list with the search kept and the date filter set, every value
 * percent-encoded
 */
fn list_href(search: Option<&str>, filter: Option<DateFilter>) -> tide::Result<String> {
    let query = serde_qs::to_string(&ListQuery {
        q: search.map(str::to_string),
        pub_date: filter.map(|f| f.key().to_string()),
    })?;
    if query.is_empty() {
        Ok(LIST_PATH.to_string())
    } else {
        Ok(format!("{}?{}", LIST_PATH, query))
    }
}

fn form_page(
    state: &AppState,
    status: StatusCode,
    id: Option<i64>,
    form: &QuestionForm,
    errors: &[String],
) -> tide::Result<Response> {
    let (title, action) = match id {
        Some(id) => ("Change question".to_string(), format!("{}/{}", LIST_PATH, id)),
        None => ("Add question".to_string(), LIST_PATH.to_string()),
    };
    state.views.page_with_status(
        status,
        "admin/question_form",
        &json!({
            "title": title,
            "action": action,
            "id": id,
            "form": form,
            "errors": errors,
        }),
    )
}

/**
 * Validate and save a submitted question form, showing it again with the problems when it is
 * rejected
 */
async fn submit(state: &AppState, id: Option<i64>, body: &str) -> tide::Result {
    let form = match QuestionForm::parse(body) {
        Ok(form) => form,
        Err(error) => {
            let shown = match id {
                Some(id) => {
                    let poll = state.polls.poll(id).await.map_err(http_error)?;
                    QuestionForm::from_poll(&poll)
                }
                None => QuestionForm::blank(),
            };
            return form_page(state, StatusCode::BadRequest, id, &shown, &[error]);
        }
    };

    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => return form_page(state, StatusCode::Ok, id, &form, &errors),
    };
    match admin::save(state.polls.repo(), id, &valid).await {
        Ok(_) => Ok(Redirect::see_other(LIST_PATH).into()),
        Err(PollError::Validation(error)) => form_page(state, StatusCode::Ok, id, &form, &[error]),
        Err(err) => Err(http_error(err)),
    }
}

/**
 *  GET /admin/
 */
pub async fn index(_req: Request<AppState>) -> tide::Result {
    Ok(Redirect::see_other(LIST_PATH).into())
}

/**
 *  GET /admin/questions?q=&pub_date=
 */
pub async fn list(req: Request<AppState>) -> tide::Result {
    let query = req.query::<ListQuery>().unwrap_or_default();
    let polls = &req.state().polls;
    let rows = admin::list(polls.repo(), &query, polls.clock().now())
        .await
        .map_err(http_error)?;

    let search = query.search();
    let selected = query.date_filter();
    let mut filters = vec![];
    for f in DateFilter::ALL.iter() {
        filters.push(json!({
            "key": f.key(),
            "label": f.label(),
            "selected": selected == Some(*f),
            "href": list_href(search, Some(*f))?,
        }));
    }

    req.state().views.page(
        "admin/questions",
        &json!({
            "questions": rows,
            "count": rows.len(),
            "q": search.unwrap_or(""),
            "filters": filters,
            "any_date": selected.is_none(),
            "any_date_href": list_href(search, None)?,
        }),
    )
}

/**
 *  GET /admin/questions/new
 */
pub async fn new(req: Request<AppState>) -> tide::Result {
    form_page(req.state(), StatusCode::Ok, None, &QuestionForm::blank(), &[])
}

/**
 *  POST /admin/questions
 */
pub async fn create(mut req: Request<AppState>) -> tide::Result {
    let body = req.body_string().await?;
    submit(req.state(), None, &body).await
}

/**
 *  GET /admin/questions/:id
 */
pub async fn edit(req: Request<AppState>) -> tide::Result {
    let id = super::question_id(&req)?;
    let poll = req.state().polls.poll(id).await.map_err(http_error)?;
    form_page(
        req.state(),
        StatusCode::Ok,
        Some(id),
        &QuestionForm::from_poll(&poll),
        &[],
    )
}

/**
 *  POST /admin/questions/:id
 */
pub async fn update(mut req: Request<AppState>) -> tide::Result {
    let id = super::question_id(&req)?;
    // an unknown question is a 404 even when the form is invalid
    req.state().polls.poll(id).await.map_err(http_error)?;

    let body = req.body_string().await?;
    submit(req.state(), Some(id), &body).await
}

/**
 *  POST /admin/questions/:id/delete
 */
pub async fn delete(req: Request<AppState>) -> tide::Result {
    let id = super::question_id(&req)?;
    admin::delete(req.state().polls.repo(), id)
        .await
        .map_err(http_error)?;
    Ok(Redirect::see_other(LIST_PATH).into())
}
