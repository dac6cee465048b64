#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum HttpStatus {
    Ok,
    BadRequest,
    NotFound,
    InternalServerError,
}

impl std::fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status_line = match self {
            Self::Ok => "200 OK",
            Self::BadRequest => "400 BAD REQUEST",
            Self::NotFound => "404 NOT FOUND",
            Self::InternalServerError => "500 INTERNAL SERVER ERROR",
        };
        write!(f, "{}", status_line)
    }
}
