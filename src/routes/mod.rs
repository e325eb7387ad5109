/*!
 * The routes module contains all the tide routes and the logic to fulfill the responses for each
 * route.
 *
 * Modules are nested for cleaner organization here
 */
use log::*;
use serde_json::json;
use tide::http::mime;
use tide::utils::After;
use tide::{Request, Response, Server, StatusCode};

use std::sync::Arc;

use crate::error::{http_error, PollError};
use crate::render::Renderer;
use crate::AppState;

pub mod admin;
pub mod polls;

/**
 * Pull the `:id` segment out of the path, anything that is not an integer can never match a
 * question
 */
pub(crate) fn question_id<State>(req: &Request<State>) -> tide::Result<i64> {
    req.param::<i64>("id")
        .ok()
        .ok_or_else(|| http_error(PollError::NotFound))
}

fn not_found_page(views: &Renderer, mut res: Response) -> tide::Result {
    if res.status() == StatusCode::NotFound {
        debug!("Rendering not found page");
        res.set_body(views.render("404", &json!({}))?);
        res.set_content_type(mime::HTML);
    }
    Ok(res)
}

/**
 * Register every route on a new tide server
 */
pub fn build(state: AppState, with_admin: bool) -> Server<AppState> {
    let views: Arc<Renderer> = state.views.clone();
    let mut app = tide::with_state(state);

    app.with(driftwood::DevLogger {});
    app.with(After(move |res: Response| {
        let views = views.clone();
        async move { not_found_page(&views, res) }
    }));

    app.at("/").get(polls::index);
    app.at("/:id").get(polls::detail);
    app.at("/:id/").get(polls::detail);
    app.at("/:id/results").get(polls::results);
    app.at("/:id/results/").get(polls::results);
    app.at("/:id/vote").post(polls::vote);
    app.at("/:id/vote/").post(polls::vote);

    if with_admin {
        info!("Mounting the admin pages under /admin/");
        app.at("/admin").get(admin::index);
        app.at("/admin/").get(admin::index);
        app.at("/admin/questions").get(admin::list).post(admin::create);
        app.at("/admin/questions/new").get(admin::new);
        app.at("/admin/questions/:id").get(admin::edit).post(admin::update);
        app.at("/admin/questions/:id/delete").post(admin::delete);
    }

    app
}
