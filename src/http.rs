use crate::error::{HelperError, HelperResult};
use std::time::Duration;

pub const USER_AGENT: &str = concat!("modding-helper/", env!("CARGO_PKG_VERSION"));

pub fn agent(read_timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(read_timeout)
        .timeout_write(Duration::from_secs(10))
        .build()
}

/// Small text documents published next to the app: the catalog, its version
/// marker, and the latest app version.
pub trait UpdaterFeed {
    fn fetch_text(&self, name: &str) -> HelperResult<String>;
}

pub struct HttpFeed {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpFeed {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: agent(Duration::from_secs(10)),
        }
    }
}

impl UpdaterFeed for HttpFeed {
    fn fetch_text(&self, name: &str) -> HelperResult<String> {
        let url = format!("{}/{}", self.base_url, name);
        let response = self
            .agent
            .get(&url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|err| HelperError::from_ureq(&url, err))?;
        response.into_string().map_err(|err| HelperError::Network {
            url,
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::{cell::RefCell, collections::HashMap};

    /// In-memory feed; unknown names behave like an unreachable host.
    #[derive(Default)]
    pub struct StaticFeed {
        pub files: HashMap<String, String>,
        pub requests: RefCell<Vec<String>>,
    }

    impl StaticFeed {
        pub fn with(mut self, name: &str, body: &str) -> Self {
            self.files.insert(name.to_string(), body.to_string());
            self
        }

        pub fn requested(&self, name: &str) -> bool {
            self.requests.borrow().iter().any(|value| value == name)
        }
    }

    impl UpdaterFeed for StaticFeed {
        fn fetch_text(&self, name: &str) -> HelperResult<String> {
            self.requests.borrow_mut().push(name.to_string());
            self.files
                .get(name)
                .cloned()
                .ok_or_else(|| HelperError::Network {
                    url: name.to_string(),
                    message: "offline".to_string(),
                })
        }
    }
}
