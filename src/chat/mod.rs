//! Streamed chat answers.
//!
//! A chat message fans out into four concurrent steps:
//!
//! | step        | source                 | event   | on failure            |
//! |-------------|------------------------|---------|-----------------------|
//! | `reply`     | completion             | `chunk` | stream ends in `error`|
//! | `intent`    | completion, JSON object| `data`  | neutral payload       |
//! | `companies` | completion, JSON array | `data`  | neutral payload       |
//! | `alumni`    | search orchestrator    | `data`  | never fails           |

mod completion;

pub use completion::{CompletionClient, OpenAiCompletionClient};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::search::{QueryFormulator, SearchLimits, SearchOrchestrator, StudentProfile};
use crate::stream::{Step, StepOutput, StreamEvent, StreamSettings, StreamingResponder};

pub const STEP_REPLY: &str = "reply";
pub const STEP_INTENT: &str = "intent";
pub const STEP_COMPANIES: &str = "companies";
pub const STEP_ALUMNI: &str = "alumni";

pub const INTENT_UNAVAILABLE: &str = "We couldn't pin down what you're looking for yet.";
pub const COMPANIES_UNAVAILABLE: &str = "No company suggestions are available right now.";
pub const NO_ALUMNI_FOUND: &str = "No matching alumni found yet. Try rephrasing your question.";

const REPLY_PROMPT: &str = "You are Milo, a career advisor for Yale students. \
Answer the student's question in a few warm, concrete sentences. \
Take their major, interests and skills into account when they are given.";

const INTENT_PROMPT: &str = "Classify the student's career question. \
Respond with only a JSON object with the keys \"intent\" (string), \
\"keywords\", \"industries\" and \"locations\" (arrays of strings).";

const COMPANIES_PROMPT: &str = "Suggest up to five companies the student could target. \
Respond with only a JSON array of objects with the keys \"name\" and \"reason\".";

/// What the student is asking about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatIntent {
    pub intent: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySuggestion {
    pub name: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CompanyList {
    Bare(Vec<CompanySuggestion>),
    Wrapped { companies: Vec<CompanySuggestion> },
}

/// Builds and streams the chat steps for one message.
#[derive(Clone)]
pub struct ChatPipeline {
    completion: Arc<dyn CompletionClient>,
    orchestrator: SearchOrchestrator,
    limits: SearchLimits,
    responder: StreamingResponder,
}

impl ChatPipeline {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        orchestrator: SearchOrchestrator,
        config: &ChatConfig,
    ) -> Self {
        Self {
            completion,
            orchestrator,
            limits: config.limits(),
            responder: StreamingResponder::new(StreamSettings::from(config)),
        }
    }

    pub fn with_responder(mut self, responder: StreamingResponder) -> Self {
        self.responder = responder;
        self
    }

    /// Start answering `message` and return the event stream.
    pub fn stream(
        &self,
        message: &str,
        profile: Option<StudentProfile>,
    ) -> mpsc::Receiver<StreamEvent> {
        info!(chars = message.len(), has_profile = profile.is_some(), "Chat request");
        self.responder.spawn(self.steps(message, profile))
    }

    /// The four steps for `message`, not yet started.
    pub fn steps(&self, message: &str, profile: Option<StudentProfile>) -> Vec<Step> {
        let prompt = QueryFormulator::formulate(message, profile.as_ref());

        let reply = {
            let completion = Arc::clone(&self.completion);
            let prompt = prompt.clone();
            Step::new(STEP_REPLY, async move {
                let text = completion.complete(REPLY_PROMPT, &prompt).await?;
                Ok(StepOutput::Text(text))
            })
        };

        let intent = {
            let completion = Arc::clone(&self.completion);
            let prompt = prompt.clone();
            Step::new(STEP_INTENT, async move {
                let payload = match structured::<ChatIntent>(
                    completion.as_ref(),
                    STEP_INTENT,
                    INTENT_PROMPT,
                    &prompt,
                    parse_intent,
                )
                .await
                {
                    Some(intent) => json!({ "intent": intent }),
                    None => json!({ "intent": null, "message": INTENT_UNAVAILABLE }),
                };
                Ok(StepOutput::Data(payload))
            })
        };

        let companies = {
            let completion = Arc::clone(&self.completion);
            let prompt = prompt.clone();
            Step::new(STEP_COMPANIES, async move {
                let payload = match structured::<Vec<CompanySuggestion>>(
                    completion.as_ref(),
                    STEP_COMPANIES,
                    COMPANIES_PROMPT,
                    &prompt,
                    parse_companies,
                )
                .await
                {
                    Some(companies) => json!({ "companies": companies }),
                    None => json!({ "companies": [], "message": COMPANIES_UNAVAILABLE }),
                };
                Ok(StepOutput::Data(payload))
            })
        };

        let alumni = {
            let orchestrator = self.orchestrator.clone();
            let limits = self.limits;
            Step::new(STEP_ALUMNI, async move {
                let outcome = orchestrator
                    .search_with(&prompt, profile.as_ref(), limits)
                    .await;
                let found = outcome.results.len();
                let mut payload = json!({
                    "alumni": outcome.results,
                    "source": outcome.path,
                });
                if found == 0 {
                    payload["message"] = json!(NO_ALUMNI_FOUND);
                }
                Ok(StepOutput::Data(payload))
            })
        };

        vec![reply, intent, companies, alumni]
    }
}

/// Run a completion whose output should decode with `parse`.
///
/// Both completion failures and undecodable output yield `None`.
async fn structured<T>(
    completion: &dyn CompletionClient,
    step: &'static str,
    system: &str,
    user: &str,
    parse: fn(&str) -> Result<T>,
) -> Option<T> {
    let raw = match completion.complete(system, user).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(step, error = %e, "Completion failed, sending neutral payload");
            metrics::record_upstream_error("completion");
            return None;
        }
    };
    match parse(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(step, error = %e, "Malformed completion output");
            metrics::record_malformed_response(step);
            None
        }
    }
}

/// Decode the intent object from model output.
pub fn parse_intent(raw: &str) -> Result<ChatIntent> {
    let intent: ChatIntent = decode_block(raw, '{', '}')?;
    if intent.intent.trim().is_empty() {
        return Err(Error::MalformedResponse("intent is empty".to_string()));
    }
    Ok(intent)
}

/// Decode company suggestions from model output.
///
/// Accepts a bare array or an object with a `companies` array. Entries
/// without a name are dropped.
pub fn parse_companies(raw: &str) -> Result<Vec<CompanySuggestion>> {
    let list = decode_block::<Vec<CompanySuggestion>>(raw, '[', ']')
        .map(CompanyList::Bare)
        .or_else(|_| decode_block::<CompanyList>(raw, '{', '}'))?;
    let companies = match list {
        CompanyList::Bare(companies) | CompanyList::Wrapped { companies } => companies,
    };
    Ok(companies
        .into_iter()
        .filter(|c| !c.name.trim().is_empty())
        .collect())
}

/// Decode the outermost `open`..`close` block of `raw`.
///
/// Models often wrap JSON in code fences or prose; everything outside the
/// block is ignored.
fn decode_block<T: DeserializeOwned>(raw: &str, open: char, close: char) -> Result<T> {
    let start = raw.find(open);
    let end = raw.rfind(close);
    let block = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => {
            return Err(Error::MalformedResponse(format!(
                "no {}...{} block in output",
                open, close
            )))
        }
    };
    let value: JsonValue = serde_json::from_str(block)
        .map_err(|e| Error::MalformedResponse(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::MalformedResponse(e.to_string()))
}
