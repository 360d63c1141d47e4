//! Conversation orchestration
//!
//! Drives one turn: resolve the user's thread (creating it on first
//! contact), append the message, run the assistant to a terminal state
//! while servicing any action requests, and return the reply text.

#[cfg(test)]
pub mod testing;

use crate::actions::{ActionOutcome, ActionRegistry};
use crate::assistant::{
    ActionOutput, ActionRequest, AssistantError, AssistantService, RunStatus,
};
use crate::db::{Database, DbError};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Fixed reply when a run ends in a failure state. Raw remote errors never
/// reach the caller.
pub const FAILURE_REPLY: &str =
    "There was an error completing your request. Please try again.";

/// Fixed reply when a turn exhausts its wall-clock deadline
pub const TIMEOUT_REPLY: &str =
    "Your request is taking longer than expected. Please try again.";

const MAX_RETRY_ATTEMPTS: u32 = 3;

fn retry_delay(attempt: u32) -> Duration {
    // Exponential backoff: 1s, 2s, 4s
    Duration::from_secs(1 << (attempt - 1))
}

/// Polling cadence and per-turn budget
#[derive(Debug, Clone)]
pub struct TurnLimits {
    /// Delay between run status polls
    pub poll_interval: Duration,
    /// Wall-clock budget for one turn, measured from entry
    pub deadline: Duration,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            deadline: Duration::from_secs(120),
        }
    }
}

/// Errors that escape a turn. Only local persistence problems do; remote
/// and action failures are absorbed into the fixed replies.
#[derive(Error, Debug)]
pub enum TurnError {
    #[error(transparent)]
    Db(#[from] DbError),
}

/// How a driven run ended
enum RunDisposition {
    Completed,
    Failed,
    TimedOut,
}

/// Turn orchestrator. All collaborators are injected at construction; the
/// struct owns no global state.
pub struct Orchestrator {
    assistant: Arc<dyn AssistantService>,
    db: Database,
    actions: ActionRegistry,
    limits: TurnLimits,
    /// Per-user guards serializing the check-then-create of a thread
    thread_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(assistant: Arc<dyn AssistantService>, db: Database, actions: ActionRegistry) -> Self {
        Self::with_limits(assistant, db, actions, TurnLimits::default())
    }

    pub fn with_limits(
        assistant: Arc<dyn AssistantService>,
        db: Database,
        actions: ActionRegistry,
        limits: TurnLimits,
    ) -> Self {
        Self {
            assistant,
            db,
            actions,
            limits,
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one user turn, always producing reply text. `Err` is reserved
    /// for local persistence failures; everything remote degrades to a
    /// fixed reply.
    pub async fn handle_turn(&self, user_id: &str, message: &str) -> Result<String, TurnError> {
        let deadline = Instant::now() + self.limits.deadline;

        tracing::info!(user_id, message_chars = message.len(), "Handling turn");

        let thread_id = match self.resolve_or_create_thread(user_id, deadline).await {
            Ok(thread_id) => thread_id,
            Err(ResolveError::Db(e)) => return Err(e.into()),
            Err(ResolveError::Remote(e)) => {
                tracing::error!(user_id, error = %e.message, "Could not obtain a thread");
                return Ok(FAILURE_REPLY.to_string());
            }
        };

        if let Err(e) = self
            .with_retries(deadline, || self.assistant.add_user_message(&thread_id, message))
            .await
        {
            tracing::error!(thread_id = %thread_id, error = %e.message, "Could not append user message");
            return Ok(FAILURE_REPLY.to_string());
        }

        match self.drive_run(&thread_id, deadline).await {
            RunDisposition::Completed => {}
            RunDisposition::Failed => return Ok(FAILURE_REPLY.to_string()),
            RunDisposition::TimedOut => return Ok(TIMEOUT_REPLY.to_string()),
        }

        match self
            .with_retries(deadline, || self.assistant.latest_assistant_reply(&thread_id))
            .await
        {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => {
                tracing::warn!(thread_id = %thread_id, "Run completed without an assistant reply");
                Ok(FAILURE_REPLY.to_string())
            }
            Err(e) => {
                tracing::error!(thread_id = %thread_id, error = %e.message, "Could not fetch the reply");
                Ok(FAILURE_REPLY.to_string())
            }
        }
    }

    /// Clear every session mapping and dump the order store to the log.
    /// Returns the number of sessions removed.
    pub fn reset_sessions(&self) -> Result<usize, TurnError> {
        let removed = self.db.reset_threads()?;
        tracing::info!(removed, "Session store reset");

        for (order_id, status) in self.db.list_orders()? {
            tracing::info!(order_id, status = %status, "Order record");
        }

        Ok(removed)
    }

    /// Existing thread handle for the user, or a freshly created one.
    /// Double-checked under a per-user lock so concurrent first messages
    /// cannot create two threads for one user.
    async fn resolve_or_create_thread(
        &self,
        user_id: &str,
        deadline: Instant,
    ) -> Result<String, ResolveError> {
        if let Some(existing) = self.db.thread_for_user(user_id)? {
            return Ok(existing);
        }

        let guard = self.lock_for_user(user_id).await;
        let _held = guard.lock().await;

        // Re-check: another turn may have created the thread while we
        // waited for the lock.
        if let Some(existing) = self.db.thread_for_user(user_id)? {
            return Ok(existing);
        }

        let created = self
            .with_retries(deadline, || self.assistant.create_thread())
            .await?;
        let stored = self.db.insert_thread(user_id, &created)?;
        tracing::info!(user_id, thread_id = %stored, "Created thread for new user");
        Ok(stored)
    }

    async fn lock_for_user(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.thread_locks.lock().await;
        locks.entry(user_id.to_string()).or_default().clone()
    }

    /// Drive a run to a terminal state, servicing action requests as the
    /// run pauses for them.
    async fn drive_run(&self, thread_id: &str, deadline: Instant) -> RunDisposition {
        let mut run = match self
            .with_retries(deadline, || self.assistant.create_run(thread_id))
            .await
        {
            Ok(run) => run,
            Err(e) => {
                tracing::error!(thread_id, error = %e.message, "Could not start a run");
                return RunDisposition::Failed;
            }
        };

        // Call ids already dispatched (serviced or refused); a re-polled
        // pause must not run the same side effects twice.
        let mut handled_calls: HashSet<String> = HashSet::new();

        loop {
            match run.status {
                RunStatus::Completed => return RunDisposition::Completed,
                status if status.is_failure() => {
                    tracing::warn!(run_id = %run.id, ?status, "Run ended in a failure state");
                    return RunDisposition::Failed;
                }
                RunStatus::RequiresAction => {
                    let unseen: Vec<&ActionRequest> = run
                        .pending_actions
                        .iter()
                        .filter(|request| !handled_calls.contains(&request.call_id))
                        .collect();

                    if !unseen.is_empty() {
                        let outputs = self.service_actions(&unseen).await;
                        handled_calls
                            .extend(unseen.iter().map(|request| request.call_id.clone()));

                        if outputs.is_empty() {
                            // Nothing serviceable: submit no synthetic
                            // results; the remote run's own expiry (or our
                            // deadline) ends the pause.
                            tracing::warn!(
                                run_id = %run.id,
                                "Run paused with no serviceable actions; polling without submitting"
                            );
                        } else {
                            let run_id = run.id.clone();
                            match self
                                .with_retries(deadline, || {
                                    self.assistant
                                        .submit_action_outputs(thread_id, &run_id, &outputs)
                                })
                                .await
                            {
                                Ok(next) => {
                                    run = next;
                                    continue;
                                }
                                Err(e) => {
                                    tracing::error!(
                                        run_id = %run_id,
                                        error = %e.message,
                                        "Could not submit action outputs"
                                    );
                                    return RunDisposition::Failed;
                                }
                            }
                        }
                    }
                }
                _ => {} // queued / in_progress / cancelling / unknown: keep polling
            }

            if Instant::now() >= deadline {
                tracing::warn!(run_id = %run.id, "Turn deadline exceeded");
                return RunDisposition::TimedOut;
            }

            tokio::time::sleep(self.limits.poll_interval).await;

            let run_id = run.id.clone();
            run = match self
                .with_retries(deadline, || self.assistant.get_run(thread_id, &run_id))
                .await
            {
                Ok(run) => run,
                Err(e) => {
                    tracing::error!(run_id = %run_id, error = %e.message, "Run poll failed");
                    return RunDisposition::Failed;
                }
            };
        }
    }

    /// Dispatch each request through the registry. Input errors contribute
    /// no result; the run decides how to proceed without them.
    async fn service_actions(&self, requests: &[&ActionRequest]) -> Vec<ActionOutput> {
        let mut outputs = Vec::with_capacity(requests.len());
        for request in requests {
            match self.actions.dispatch(&request.name, &request.arguments).await {
                ActionOutcome::Success(output) => {
                    outputs.push(ActionOutput::new(request.call_id.as_str(), output));
                }
                ActionOutcome::InputError => {
                    tracing::warn!(
                        action = %request.name,
                        call_id = %request.call_id,
                        "Excluding unserviceable action from the result batch"
                    );
                }
            }
        }
        outputs
    }

    /// Run a remote call, retrying transient failures with exponential
    /// backoff until the attempts or the turn deadline run out.
    async fn with_retries<T, F, Fut>(
        &self,
        deadline: Instant,
        mut call: F,
    ) -> Result<T, AssistantError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AssistantError>>,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.kind.is_retryable()
                    && attempt + 1 < MAX_RETRY_ATTEMPTS
                    && Instant::now() < deadline =>
                {
                    attempt += 1;
                    let delay = e.retry_after.unwrap_or_else(|| retry_delay(attempt));
                    tracing::warn!(
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %e.message,
                        "Retrying assistant call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Failure resolving a thread handle, split so local persistence errors
/// keep propagating while remote ones degrade to the fixed reply.
enum ResolveError {
    Db(DbError),
    Remote(AssistantError),
}

impl From<DbError> for ResolveError {
    fn from(e: DbError) -> Self {
        ResolveError::Db(e)
    }
}

impl From<AssistantError> for ResolveError {
    fn from(e: AssistantError) -> Self {
        ResolveError::Remote(e)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedAssistant;
    use super::*;
    use crate::db::OrderStatus;

    fn fast_limits() -> TurnLimits {
        TurnLimits {
            poll_interval: Duration::from_millis(1),
            deadline: Duration::from_millis(250),
        }
    }

    fn orchestrator_with(
        assistant: Arc<ScriptedAssistant>,
        db: Database,
    ) -> Orchestrator {
        Orchestrator::with_limits(
            assistant,
            db.clone(),
            ActionRegistry::standard(db),
            fast_limits(),
        )
    }

    #[tokio::test]
    async fn test_turn_returns_latest_assistant_reply() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.queue_run(Ok(ScriptedAssistant::run_with_status(RunStatus::Completed)));
        assistant.queue_reply(Ok(Some("Hello there!".to_string())));

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db);

        let reply = orchestrator.handle_turn("u1", "hi").await.unwrap();
        assert_eq!(reply, "Hello there!");

        let messages = assistant.appended_messages();
        assert_eq!(messages, vec![("thread-0".to_string(), "hi".to_string())]);
    }

    #[tokio::test]
    async fn test_thread_resolution_is_idempotent() {
        let assistant = Arc::new(ScriptedAssistant::new());
        for _ in 0..2 {
            assistant.queue_run(Ok(ScriptedAssistant::run_with_status(RunStatus::Completed)));
            assistant.queue_reply(Ok(Some("ok".to_string())));
        }

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db.clone());

        orchestrator.handle_turn("u1", "first").await.unwrap();
        orchestrator.handle_turn("u1", "second").await.unwrap();

        assert_eq!(assistant.created_thread_count(), 1);
        assert_eq!(db.thread_for_user("u1").unwrap(), Some("thread-0".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_first_messages_create_one_thread() {
        let assistant = Arc::new(ScriptedAssistant::new());
        for _ in 0..2 {
            assistant.queue_run(Ok(ScriptedAssistant::run_with_status(RunStatus::Completed)));
            assistant.queue_reply(Ok(Some("ok".to_string())));
        }

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db.clone());

        let (a, b) = tokio::join!(
            orchestrator.handle_turn("u1", "one"),
            orchestrator.handle_turn("u1", "two"),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(assistant.created_thread_count(), 1);
    }

    #[tokio::test]
    async fn test_requires_action_services_and_submits_batch() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.queue_run(Ok(ScriptedAssistant::run_requiring(vec![ActionRequest {
            call_id: "call_1".to_string(),
            name: "get_order_status".to_string(),
            arguments: r#"{"order_id": "150"}"#.to_string(),
        }])));
        // Returned by submit_action_outputs
        assistant.queue_run(Ok(ScriptedAssistant::run_with_status(RunStatus::Completed)));
        assistant.queue_reply(Ok(Some("Order 150 has Shipped".to_string())));

        let db = Database::open_in_memory().unwrap();
        db.put_order(150, OrderStatus::Shipped).unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db);

        let reply = orchestrator.handle_turn("u1", "Where is order 150?").await.unwrap();
        assert_eq!(reply, "Order 150 has Shipped");

        let submissions = assistant.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(
            submissions[0].1,
            vec![ActionOutput::new("call_1", "Shipped")]
        );
    }

    #[tokio::test]
    async fn test_input_errors_excluded_from_submitted_batch() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.queue_run(Ok(ScriptedAssistant::run_requiring(vec![
            ActionRequest {
                call_id: "call_bad".to_string(),
                name: "summon_unicorn".to_string(),
                arguments: "{}".to_string(),
            },
            ActionRequest {
                call_id: "call_good".to_string(),
                name: "request_human_representative".to_string(),
                arguments: r#"{"full_name": "Zion Ochayon", "email": "test@gmail.com", "phone": "0525650674"}"#
                    .to_string(),
            },
        ])));
        assistant.queue_run(Ok(ScriptedAssistant::run_with_status(RunStatus::Completed)));
        assistant.queue_reply(Ok(Some("A human will reach out.".to_string())));

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db.clone());

        orchestrator.handle_turn("u1", "get me a person").await.unwrap();

        let submissions = assistant.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].1.len(), 1);
        assert_eq!(submissions[0].1[0].call_id, "call_good");
        assert_eq!(db.list_contacts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_all_refused_polls_without_submitting_until_deadline() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.set_steady_run(ScriptedAssistant::run_requiring(vec![ActionRequest {
            call_id: "call_bad".to_string(),
            name: "summon_unicorn".to_string(),
            arguments: "{}".to_string(),
        }]));

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db);

        let reply = orchestrator.handle_turn("u1", "hi").await.unwrap();
        assert_eq!(reply, TIMEOUT_REPLY);
        assert!(assistant.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_yields_fixed_failure_reply() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.queue_run(Ok(ScriptedAssistant::run_with_status(RunStatus::Failed)));

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db);

        let reply = orchestrator.handle_turn("u1", "hi").await.unwrap();
        assert_eq!(reply, FAILURE_REPLY);
    }

    #[tokio::test]
    async fn test_expired_run_yields_fixed_failure_reply() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.queue_run(Ok(ScriptedAssistant::run_with_status(RunStatus::Expired)));

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db);

        let reply = orchestrator.handle_turn("u1", "hi").await.unwrap();
        assert_eq!(reply, FAILURE_REPLY);
    }

    #[tokio::test]
    async fn test_stuck_run_times_out_with_distinct_reply() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.set_steady_run(ScriptedAssistant::run_with_status(RunStatus::InProgress));

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db);

        let reply = orchestrator.handle_turn("u1", "hi").await.unwrap();
        assert_eq!(reply, TIMEOUT_REPLY);
    }

    #[tokio::test]
    async fn test_transient_poll_error_is_retried() {
        let assistant = Arc::new(ScriptedAssistant::new());
        let mut transient = AssistantError::server_error("upstream hiccup");
        transient.retry_after = Some(Duration::from_millis(1));
        assistant.queue_run(Err(transient));
        assistant.queue_run(Ok(ScriptedAssistant::run_with_status(RunStatus::Completed)));
        assistant.queue_reply(Ok(Some("ok".to_string())));

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db);

        let reply = orchestrator.handle_turn("u1", "hi").await.unwrap();
        assert_eq!(reply, "ok");
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_turn_with_fixed_reply() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.queue_run(Err(AssistantError::auth("key revoked")));

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db);

        let reply = orchestrator.handle_turn("u1", "hi").await.unwrap();
        assert_eq!(reply, FAILURE_REPLY);
    }

    #[tokio::test]
    async fn test_completed_run_without_reply_degrades_to_failure_reply() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.queue_run(Ok(ScriptedAssistant::run_with_status(RunStatus::Completed)));
        assistant.queue_reply(Ok(None));

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db);

        let reply = orchestrator.handle_turn("u1", "hi").await.unwrap();
        assert_eq!(reply, FAILURE_REPLY);
    }

    #[tokio::test]
    async fn test_thread_creation_failure_leaves_no_session() {
        let assistant = Arc::new(ScriptedAssistant::new());
        assistant.queue_create_thread_error(AssistantError::auth("key revoked"));

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db.clone());

        let reply = orchestrator.handle_turn("u1", "hi").await.unwrap();
        assert_eq!(reply, FAILURE_REPLY);
        assert_eq!(db.thread_for_user("u1").unwrap(), None);
    }

    #[tokio::test]
    async fn test_reset_sessions_forgets_users() {
        let assistant = Arc::new(ScriptedAssistant::new());
        for _ in 0..2 {
            assistant.queue_run(Ok(ScriptedAssistant::run_with_status(RunStatus::Completed)));
            assistant.queue_reply(Ok(Some("ok".to_string())));
        }

        let db = Database::open_in_memory().unwrap();
        let orchestrator = orchestrator_with(assistant.clone(), db.clone());

        orchestrator.handle_turn("u1", "first").await.unwrap();
        assert_eq!(orchestrator.reset_sessions().unwrap(), 1);

        orchestrator.handle_turn("u1", "after reset").await.unwrap();
        assert_eq!(assistant.created_thread_count(), 2);
        assert_eq!(db.thread_for_user("u1").unwrap(), Some("thread-1".to_string()));
    }
}
