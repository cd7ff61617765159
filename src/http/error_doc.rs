//! HTML error documents served by the proxy itself.

/// Status codes the proxy can answer with on its own behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    BadRequest,
    NotFound,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
}

impl ErrorStatus {
    /// Map a numeric code onto the table. Unknown codes become 500.
    pub fn from_code(code: u16) -> Self {
        match code {
            400 => ErrorStatus::BadRequest,
            404 => ErrorStatus::NotFound,
            500 => ErrorStatus::InternalServerError,
            501 => ErrorStatus::NotImplemented,
            502 => ErrorStatus::BadGateway,
            503 => ErrorStatus::ServiceUnavailable,
            _ => ErrorStatus::InternalServerError,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            ErrorStatus::BadRequest => 400,
            ErrorStatus::NotFound => 404,
            ErrorStatus::InternalServerError => 500,
            ErrorStatus::NotImplemented => 501,
            ErrorStatus::BadGateway => 502,
            ErrorStatus::ServiceUnavailable => 503,
        }
    }

    /// Code and reason phrase, e.g. `404 Not Found`.
    pub fn heading(&self) -> &'static str {
        match self {
            ErrorStatus::BadRequest => "400 Bad Request",
            ErrorStatus::NotFound => "404 Not Found",
            ErrorStatus::InternalServerError => "500 Internal Server Error",
            ErrorStatus::NotImplemented => "501 Not Implemented",
            ErrorStatus::BadGateway => "502 Bad Gateway",
            ErrorStatus::ServiceUnavailable => "503 Service Unavailable",
        }
    }

    /// Reason phrase alone, e.g. `Not Found`.
    pub fn phrase(&self) -> &'static str {
        let heading = self.heading();
        heading.split_once(' ').map_or(heading, |(_, phrase)| phrase)
    }

    /// Default HTML description.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorStatus::BadRequest => "<p>Received invalid request.</p>\n",
            ErrorStatus::NotFound => "<p>Resource is not found on remote server.</p>\n",
            ErrorStatus::InternalServerError => {
                "<p>Internal error occurred in proxy server. Please refresh the webpage or try again later. \
                 If the problem persists, please report the issue to the webmaster.</p>\n"
            }
            ErrorStatus::NotImplemented => "<p>Unable to parse HTTP request.</p>\n",
            ErrorStatus::BadGateway => {
                "<p>Received invalid response from remote server. Please refresh the webpage or try again later.</p>\n"
            }
            ErrorStatus::ServiceUnavailable => {
                "<p>Server is busy. Please refresh the webpage or try again later.</p>\n"
            }
        }
    }
}

/// Render the HTML error page for `status`.
///
/// `description` replaces the table default when given.
pub fn render_error_document(status: ErrorStatus, description: Option<&str>) -> String {
    let heading = status.heading();
    let description = description.unwrap_or_else(|| status.description());
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <meta charset='UTF-8' />\n\
         <title>{heading}</title>\n\
         </head>\n\
         <body>\n\
         <h1>{heading}</h1>\n\
         {description}\
         </body>\n\
         </html>"
    )
}
