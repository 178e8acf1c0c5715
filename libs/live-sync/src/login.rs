//! Login flows that turn credentials or provider payloads into a cached
//! identity. This is a demo: passwords are validated for shape only and
//! never stored or checked.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::SessionError;
use crate::model::Identity;
use crate::ports::{IdentityProvider, ProviderProfile, UserRegistry};
use crate::session::SessionCache;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct SignUp {
    pub email: String,
    pub name: String,
    pub password: String,
    pub confirm_password: String,
    pub avatar: Option<Url>,
}

/// Payload carried by the OAuth callback redirect (`?user=<json>`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedirectPayload {
    token_identifier: String,
    name: String,
    #[serde(default)]
    profile_image: Option<String>,
}

#[derive(Clone)]
pub struct LoginFlow {
    session: Arc<SessionCache>,
    registry: Arc<dyn UserRegistry>,
}

impl LoginFlow {
    pub fn new(session: Arc<SessionCache>, registry: Arc<dyn UserRegistry>) -> Self {
        Self { session, registry }
    }

    pub fn session(&self) -> &Arc<SessionCache> {
        &self.session
    }

    #[instrument(name = "live_sync.login.sign_in", skip_all, fields(email = %creds.email))]
    pub fn sign_in(&self, creds: &Credentials) -> Result<Arc<Identity>, SessionError> {
        self.run(|| {
            validate_email(&creds.email)?;
            if creds.password.trim().is_empty() {
                return Err(SessionError::invalid_credentials("Please enter your password"));
            }
            Ok(identity_for(&creds.email, "", None))
        })
    }

    #[instrument(name = "live_sync.login.sign_up", skip_all, fields(email = %form.email))]
    pub fn sign_up(&self, form: &SignUp) -> Result<Arc<Identity>, SessionError> {
        self.run(|| {
            validate_email(&form.email)?;
            if form.name.trim().is_empty() {
                return Err(SessionError::invalid_credentials("Please enter your full name"));
            }
            if form.password.trim().is_empty() {
                return Err(SessionError::invalid_credentials("Please enter a password"));
            }
            if form.password.chars().count() < MIN_PASSWORD_LEN {
                return Err(SessionError::invalid_credentials(
                    "Password must be at least 6 characters",
                ));
            }
            if form.password != form.confirm_password {
                return Err(SessionError::invalid_credentials("Passwords do not match"));
            }
            Ok(identity_for(&form.email, &form.name, form.avatar.clone()))
        })
    }

    /// Log in from the JSON the OAuth callback appends to its redirect.
    #[instrument(name = "live_sync.login.from_redirect", skip_all)]
    pub fn from_redirect_payload(&self, payload: &str) -> Result<Arc<Identity>, SessionError> {
        self.run(|| {
            let payload: RedirectPayload = serde_json::from_str(payload)
                .map_err(|e| SessionError::malformed_payload(e.to_string()))?;
            if payload.token_identifier.trim().is_empty() {
                return Err(SessionError::malformed_payload("empty tokenIdentifier"));
            }
            let avatar = parse_avatar(payload.profile_image.as_deref());
            Ok(Identity::new(payload.token_identifier, payload.name).with_avatar(avatar))
        })
    }

    /// Exchange a provider authorization code and log in with the profile.
    #[instrument(name = "live_sync.login.from_provider", skip_all)]
    pub async fn from_provider(
        &self,
        provider: &dyn IdentityProvider,
        code: &str,
    ) -> Result<Arc<Identity>, SessionError> {
        self.session.begin_login()?;
        let profile = match provider.exchange_code(code).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(error = %err, "provider login failed");
                self.session.abort_login();
                return Err(err);
            }
        };
        self.finish(profile_identity(profile))
    }

    fn run<F>(&self, build: F) -> Result<Arc<Identity>, SessionError>
    where
        F: FnOnce() -> Result<Identity, SessionError>,
    {
        self.session.begin_login()?;
        match build() {
            Ok(identity) => self.finish(identity),
            Err(err) => {
                debug!(error = %err, "login rejected");
                self.session.abort_login();
                Err(err)
            }
        }
    }

    /// Cache the identity right away and register the user in the
    /// background; a failed registration never undoes the login.
    fn finish(&self, identity: Identity) -> Result<Arc<Identity>, SessionError> {
        let identity = self.session.complete_login(identity)?;
        self.store_in_background(identity.clone());
        Ok(identity)
    }

    fn store_in_background(&self, identity: Arc<Identity>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(user = %identity.id, "no async runtime; user not registered");
            return;
        };
        let registry = self.registry.clone();
        handle.spawn(async move {
            if let Err(err) = registry.store_user(&identity).await {
                warn!(user = %identity.id, error = %err, "background user registration failed");
            }
        });
    }
}

fn validate_email(email: &str) -> Result<(), SessionError> {
    if email.trim().is_empty() {
        return Err(SessionError::invalid_credentials("Please enter email address"));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(SessionError::invalid_credentials(
            "Please enter a valid email address",
        ));
    }
    Ok(())
}

/// The email doubles as the stable identity token; the display name falls
/// back to the email's local part.
fn identity_for(email: &str, name: &str, avatar: Option<Url>) -> Identity {
    let display_name = if name.is_empty() {
        email.split('@').next().unwrap_or(email)
    } else {
        name
    };
    Identity::new(email, display_name).with_avatar(avatar)
}

fn profile_identity(profile: ProviderProfile) -> Identity {
    let avatar = parse_avatar(profile.avatar_url.as_deref());
    identity_for(&profile.email, &profile.display_name, avatar)
}

fn parse_avatar(raw: Option<&str>) -> Option<Url> {
    let raw = raw.filter(|s| !s.is_empty())?;
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            debug!(error = %e, "ignoring unparseable avatar reference");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::session::SessionPhase;
    use crate::testing::RecordingRegistry;
    use async_trait::async_trait;
    use tracing_test::traced_test;

    fn flow() -> (LoginFlow, Arc<RecordingRegistry>) {
        let registry = RecordingRegistry::new();
        (LoginFlow::new(SessionCache::shared(), registry.clone()), registry)
    }

    #[tokio::test]
    async fn sign_in_caches_identity_and_registers_in_background() {
        let (flow, registry) = flow();
        let identity = flow
            .sign_in(&Credentials {
                email: "alice@example.com".into(),
                password: "x".into(),
            })
            .unwrap();

        assert_eq!(identity.id, "alice@example.com");
        assert_eq!(identity.display_name, "alice");
        assert_eq!(flow.session().phase(), SessionPhase::LoggedIn);

        registry.wait_for(1).await;
        assert_eq!(registry.stored()[0].id, "alice@example.com");
    }

    #[test]
    fn invalid_credentials_abort_the_login() {
        let (flow, _) = flow();
        let cases = [
            ("", "pw", "Please enter email address"),
            ("not-an-email", "pw", "Please enter a valid email address"),
            ("a@b", "pw", "Please enter a valid email address"),
            ("a@b.co", "   ", "Please enter your password"),
        ];
        for (email, password, message) in cases {
            let err = flow
                .sign_in(&Credentials {
                    email: email.into(),
                    password: password.into(),
                })
                .unwrap_err();
            assert_eq!(err, SessionError::invalid_credentials(message));
            assert_eq!(flow.session().phase(), SessionPhase::LoggedOut);
        }
    }

    #[test]
    fn sign_up_rules() {
        let (flow, _) = flow();
        let base = SignUp {
            email: "bob@example.com".into(),
            name: "Bob".into(),
            password: "secret1".into(),
            confirm_password: "secret1".into(),
            avatar: None,
        };

        let short = SignUp {
            password: "abc".into(),
            confirm_password: "abc".into(),
            ..base.clone()
        };
        assert_eq!(
            flow.sign_up(&short).unwrap_err(),
            SessionError::invalid_credentials("Password must be at least 6 characters")
        );

        let mismatch = SignUp {
            confirm_password: "secret2".into(),
            ..base.clone()
        };
        assert_eq!(
            flow.sign_up(&mismatch).unwrap_err(),
            SessionError::invalid_credentials("Passwords do not match")
        );

        let nameless = SignUp {
            name: " ".into(),
            ..base.clone()
        };
        assert_eq!(
            flow.sign_up(&nameless).unwrap_err(),
            SessionError::invalid_credentials("Please enter your full name")
        );

        // No runtime here: the identity is still cached.
        let identity = flow.sign_up(&base).unwrap();
        assert_eq!(identity.display_name, "Bob");
    }

    #[test]
    fn redirect_payload_login() {
        let (flow, _) = flow();
        let identity = flow
            .from_redirect_payload(
                r#"{"tokenIdentifier":"g@gmail.com","name":"Gee","profileImage":"https://img.example.com/g.png"}"#,
            )
            .unwrap();
        assert_eq!(identity.id, "g@gmail.com");
        assert_eq!(
            identity.avatar_ref.as_ref().map(Url::as_str),
            Some("https://img.example.com/g.png")
        );

        flow.session().logout();
        let err = flow.from_redirect_payload("{not json").unwrap_err();
        assert!(matches!(err, SessionError::MalformedPayload { .. }));
        assert_eq!(flow.session().phase(), SessionPhase::LoggedOut);
    }

    struct StaticProvider(Result<ProviderProfile, SessionError>);

    #[async_trait]
    impl IdentityProvider for StaticProvider {
        async fn exchange_code(&self, _code: &str) -> Result<ProviderProfile, SessionError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn provider_login_and_failure() {
        let (flow, registry) = flow();
        let failing = StaticProvider(Err(SessionError::provider("oauth_failed")));
        assert_eq!(
            flow.from_provider(&failing, "code").await.unwrap_err(),
            SessionError::provider("oauth_failed")
        );
        assert_eq!(flow.session().phase(), SessionPhase::LoggedOut);

        let ok = StaticProvider(Ok(ProviderProfile {
            email: "c@corp.io".into(),
            display_name: "Cee".into(),
            avatar_url: None,
        }));
        let identity = flow.from_provider(&ok, "code").await.unwrap();
        assert_eq!(identity.display_name, "Cee");
        registry.wait_for(1).await;
    }

    #[traced_test]
    #[tokio::test]
    async fn failed_registration_keeps_the_login() {
        let registry = RecordingRegistry::failing(ServiceError::unavailable("down"));
        let flow = LoginFlow::new(SessionCache::shared(), registry.clone());
        flow.sign_in(&Credentials {
            email: "d@x.io".into(),
            password: "pw".into(),
        })
        .unwrap();
        registry.wait_for(1).await;
        assert!(flow.session().is_logged_in());
        assert!(logs_contain("background user registration failed"));
    }
}
