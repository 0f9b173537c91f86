use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Transport failure or non-2xx HTTP status.
    #[error("connection error: {0}")]
    ConnectionError(String),
    /// Device answered, but with a non-OK status or an unusable payload.
    #[error("protocol error: {0}")]
    ProtocolError(String),
    /// Login hash rejected by the device.
    #[error("authentication error: {0}")]
    AuthenticationError(String),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("unable to encode metrics")]
    FormatError,
    #[error("internal error")]
    InternalError,
}

fn html(status: Status, title: &str, detail: &str) -> response::Result<'static> {
    let body = format!(
        "<html><body><h3>{} {}</h3>Device response: <code>{}</code></body></html>",
        status.code, title, detail
    );
    Response::build()
        .status(status)
        .sized_body(body.len(), Cursor::new(body))
        .header(ContentType::new("text", "html"))
        .ok()
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        match self {
            Error::ConnectionError(s) => html(Status::ServiceUnavailable, "Service Unavailable", &s),
            Error::ProtocolError(s) => html(Status::BadGateway, "Bad Gateway", &s),
            Error::AuthenticationError(s) => html(Status::Forbidden, "Forbidden", &s),
            _ => html(
                Status::InternalServerError,
                "Internal Server Error",
                &format!("{:?}", self),
            ),
        }
    }
}
