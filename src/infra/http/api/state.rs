use std::sync::Arc;

use time::Duration;

use crate::application::jobs::PdfJobService;
use crate::application::sessions::SessionService;

/// Attributes of the session cookie written back on refresh.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub secure: bool,
    pub max_age: Duration,
}

impl SessionCookie {
    pub fn header_value(&self, token: &str) -> String {
        let mut value = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.name,
            token,
            self.max_age.whole_seconds()
        );
        if self.secure {
            value.push_str("; Secure");
        }
        value
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub jobs: Arc<PdfJobService>,
    pub sessions: Arc<SessionService>,
    pub cookie: SessionCookie,
}
