//! Application form submission

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::server::AppState;
use super::session::Session;
use crate::models::Notification;
use crate::state::ApplicationSubmission;

/// Form fields as posted by the application pages
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApplicationForm {
    pub discord_id: Option<String>,
    pub name: Option<String>,
    pub ooc_info: Option<String>,
    pub age: Option<String>,
    pub region: Option<String>,
    pub experience: Option<String>,
    #[serde(rename = "whyApply")]
    pub why_apply: Option<String>,
    pub stream: Option<String>,
    pub backstory: Option<String>,
    pub metagaming: Option<String>,
    pub failrp: Option<String>,
    pub scenario1: Option<String>,
    pub scenario2: Option<String>,
    pub rulebreak: Option<String>,
    #[serde(rename = "rulesLocation")]
    pub rules_location: Option<String>,
}

impl ApplicationForm {
    /// Build the stored document, stamped with `submitted_at`
    pub fn into_submission(self, submitted_at: DateTime<Utc>) -> ApplicationSubmission {
        ApplicationSubmission {
            id: Uuid::new_v4(),
            discord_id: clean(self.discord_id),
            discord_name: clean(self.name),
            ooc_info: clean(self.ooc_info),
            age: clean(self.age),
            region: clean(self.region),
            experience: clean(self.experience),
            why_apply: clean(self.why_apply),
            stream: clean(self.stream),
            backstory: clean(self.backstory),
            metagaming: clean(self.metagaming),
            failrp: clean(self.failrp),
            scenario1: clean(self.scenario1),
            scenario2: clean(self.scenario2),
            rulebreak: clean(self.rulebreak),
            rules_location: clean(self.rules_location),
            submitted_at,
        }
    }
}

/// Blank answers are stored as absent
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// POST /submit-application
///
/// The stored document is the durable result. The webhook is best effort:
/// its failure is logged and the user is still redirected.
pub async fn submit_application(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ApplicationForm>,
) -> Response {
    let submission = form.into_submission(Utc::now());

    if let Err(e) = state.applications.insert(submission.clone()).await {
        error!("Form submission failed: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong!").into_response();
    }

    info!(
        "Application {} stored for {} ({})",
        submission.id,
        submission.discord_name.as_deref().unwrap_or("unknown"),
        submission.discord_id.as_deref().unwrap_or("no id")
    );
    session.push_notification(Notification::success(
        "Your application has been submitted. Staff will review it soon.",
    ));

    if let Err(e) = state.notifier.notify_submission(&submission).await {
        warn!("Failed to send webhook for application {}: {}", submission.id, e);
    }

    Redirect::to("/application-submitted").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_to_submission() {
        let form = ApplicationForm {
            discord_id: Some("123".to_string()),
            name: Some(" jdoe ".to_string()),
            why_apply: Some("fun".to_string()),
            age: Some("   ".to_string()),
            region: Some("EU".to_string()),
            ..Default::default()
        };
        let now = Utc::now();
        let submission = form.into_submission(now);

        assert_eq!(submission.discord_id.as_deref(), Some("123"));
        assert_eq!(submission.discord_name.as_deref(), Some("jdoe"));
        assert_eq!(submission.why_apply.as_deref(), Some("fun"));
        assert_eq!(submission.age, None);
        assert_eq!(submission.backstory, None);
        assert_eq!(submission.submitted_at, now);
    }
}
