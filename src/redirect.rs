//! The redirect map: a small, read-mostly lookup behind a single lock.
//! A `HashMap` behind a `Mutex`, no pooling or generational bookkeeping
//! needed.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::context::Context;
use crate::error::HttpError;

pub struct Redirector {
    map: Mutex<HashMap<String, String>>,
    upgrade_insecure: bool,
}

pub enum Outcome {
    Handled { status: u16, location: String },
    NotHandled,
}

impl Redirector {
    pub fn new(upgrade_insecure: bool) -> Self {
        Redirector { map: Mutex::new(HashMap::new()), upgrade_insecure }
    }

    /// Source paths must not begin or end with `/`; destinations must begin
    /// with `/`. Panics on a malformed entry -- callers load `redirects.txt`
    /// line by line and are expected to validate before inserting (the
    /// launcher logs and skips malformed lines rather than calling this).
    pub fn insert(&self, source: &str, destination: &str) {
        assert!(!source.starts_with('/') && !source.ends_with('/'), "redirect source must not begin or end with '/'");
        assert!(destination.starts_with('/'), "redirect destination must begin with '/'");
        self.map.lock().unwrap().insert(source.to_lowercase(), destination.to_string());
    }

    /// Step 1: TLS upgrade takes priority over any mapped redirect, and
    /// carries the case-preserved path into the `Location`. Step 2: a mapped
    /// entry looked up by lowercased path. Step 3: not handled.
    pub fn resolve(&self, path: &str, path_lower: &str, host_without_port: &str, local_port: u16) -> Outcome {
        if self.upgrade_insecure && local_port == 80 {
            return Outcome::Handled { status: 301, location: format!("https://{}/{}", host_without_port, path) };
        }

        if let Some(dest) = self.map.lock().unwrap().get(path_lower) {
            return Outcome::Handled { status: 301, location: dest.clone() };
        }

        Outcome::NotHandled
    }

    /// Handler-shaped entry point for launcher composition: writes the 301
    /// and returns `true` if this request was a redirect, `false` if the
    /// caller should fall through to the next handler.
    pub async fn handle(&self, ctx: &mut Context<'_>) -> Result<bool, HttpError> {
        let outcome = self.resolve(&ctx.request.path, &ctx.request.path_lower, &ctx.request.host_without_port, ctx.local_addr.port());
        match outcome {
            Outcome::Handled { status, location } => {
                ctx.with_response_mut(|r| {
                    r.set_status(status, "Moved Permanently");
                    r.set_header("Location", location);
                })?;
                ctx.send_bytes(b"").await?;
                Ok(true)
            }
            Outcome::NotHandled => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_insecure_beats_any_mapping_on_port_80() {
        let r = Redirector::new(true);
        r.insert("foo", "/bar");
        match r.resolve("Foo", "foo", "example.com", 80) {
            Outcome::Handled { status, location } => {
                assert_eq!(status, 301);
                assert_eq!(location, "https://example.com/Foo");
            }
            Outcome::NotHandled => panic!("expected handled"),
        }
    }

    #[test]
    fn mapped_redirect_applies_when_not_upgrading() {
        let r = Redirector::new(false);
        r.insert("foo", "/bar");
        match r.resolve("foo", "foo", "example.com", 80) {
            Outcome::Handled { location, .. } => assert_eq!(location, "/bar"),
            Outcome::NotHandled => panic!("expected handled"),
        }
    }

    #[test]
    fn unmapped_path_is_not_handled() {
        let r = Redirector::new(false);
        assert!(matches!(r.resolve("nope", "nope", "example.com", 80), Outcome::NotHandled));
    }

    #[test]
    #[should_panic]
    fn source_with_leading_slash_is_rejected() {
        let r = Redirector::new(false);
        r.insert("/foo", "/bar");
    }
}
