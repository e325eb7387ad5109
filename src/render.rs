use handlebars::{handlebars_helper, Handlebars, TemplateFileError};
use log::*;
use serde::Serialize;
use tide::http::mime;
use tide::{Response, StatusCode};

use std::path::Path;

handlebars_helper!(pluralize: |count: i64| if count == 1 { "" } else { "s" });

/**
 * Renders the handlebars views into HTML responses
 */
pub struct Renderer {
    hb: Handlebars<'static>,
}

impl Renderer {
    /**
     * Load every `.hbs` file under `dir`, a template at `dir/admin/questions.hbs` is named
     * `admin/questions`
     */
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self, TemplateFileError> {
        let mut hb = Handlebars::new();
        hb.register_helper("pluralize", Box::new(pluralize));
        hb.register_templates_directory(".hbs", dir)?;
        Ok(Self { hb })
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> tide::Result<String> {
        self.hb.render(name, data).map_err(|err| {
            error!("Failed to render {}: {:?}", name, err);
            tide::Error::from_str(StatusCode::InternalServerError, "Failed to render page")
        })
    }

    pub fn page<T: Serialize>(&self, name: &str, data: &T) -> tide::Result<Response> {
        self.page_with_status(StatusCode::Ok, name, data)
    }

    pub fn page_with_status<T: Serialize>(
        &self,
        status: StatusCode,
        name: &str,
        data: &T,
    ) -> tide::Result<Response> {
        let body = self.render(name, data)?;
        Ok(Response::builder(status)
            .body(body)
            .content_type(mime::HTML)
            .build())
    }
}
