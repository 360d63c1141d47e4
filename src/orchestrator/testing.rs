//! Scripted assistant for orchestrator tests
//!
//! Queues run states and replies ahead of time and records every call, so
//! turns can be driven without real I/O.

use crate::assistant::{
    ActionOutput, ActionRequest, AssistantError, AssistantService, Run, RunStatus,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub struct ScriptedAssistant {
    /// Run states consumed in order by create_run / get_run /
    /// submit_action_outputs
    runs: Mutex<VecDeque<Result<Run, AssistantError>>>,
    /// Returned whenever the run queue is empty; lets polling tests spin
    /// against a run that never advances
    steady_run: Mutex<Option<Run>>,
    replies: Mutex<VecDeque<Result<Option<String>, AssistantError>>>,
    create_thread_errors: Mutex<VecDeque<AssistantError>>,
    created_threads: Mutex<Vec<String>>,
    messages: Mutex<Vec<(String, String)>>,
    submissions: Mutex<Vec<(String, Vec<ActionOutput>)>>,
}

impl ScriptedAssistant {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(VecDeque::new()),
            steady_run: Mutex::new(None),
            replies: Mutex::new(VecDeque::new()),
            create_thread_errors: Mutex::new(VecDeque::new()),
            created_threads: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Queue the next run state (or error) to hand out
    pub fn queue_run(&self, run: Result<Run, AssistantError>) {
        self.runs.lock().unwrap().push_back(run);
    }

    /// Run state returned whenever the queue is empty
    pub fn set_steady_run(&self, run: Run) {
        *self.steady_run.lock().unwrap() = Some(run);
    }

    pub fn queue_reply(&self, reply: Result<Option<String>, AssistantError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn queue_create_thread_error(&self, error: AssistantError) {
        self.create_thread_errors.lock().unwrap().push_back(error);
    }

    pub fn run_with_status(status: RunStatus) -> Run {
        Run {
            id: "run-0".to_string(),
            status,
            pending_actions: Vec::new(),
        }
    }

    pub fn run_requiring(pending_actions: Vec<ActionRequest>) -> Run {
        Run {
            id: "run-0".to_string(),
            status: RunStatus::RequiresAction,
            pending_actions,
        }
    }

    pub fn created_thread_count(&self) -> usize {
        self.created_threads.lock().unwrap().len()
    }

    pub fn appended_messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<(String, Vec<ActionOutput>)> {
        self.submissions.lock().unwrap().clone()
    }

    fn next_run(&self) -> Result<Run, AssistantError> {
        if let Some(run) = self.runs.lock().unwrap().pop_front() {
            return run;
        }
        if let Some(run) = self.steady_run.lock().unwrap().clone() {
            return Ok(run);
        }
        Err(AssistantError::unknown("No scripted run state queued"))
    }
}

#[async_trait]
impl AssistantService for ScriptedAssistant {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        if let Some(error) = self.create_thread_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut created = self.created_threads.lock().unwrap();
        let thread_id = format!("thread-{}", created.len());
        created.push(thread_id.clone());
        Ok(thread_id)
    }

    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<(), AssistantError> {
        self.messages
            .lock()
            .unwrap()
            .push((thread_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn create_run(&self, _thread_id: &str) -> Result<Run, AssistantError> {
        self.next_run()
    }

    async fn get_run(&self, _thread_id: &str, _run_id: &str) -> Result<Run, AssistantError> {
        self.next_run()
    }

    async fn submit_action_outputs(
        &self,
        thread_id: &str,
        _run_id: &str,
        outputs: &[ActionOutput],
    ) -> Result<Run, AssistantError> {
        self.submissions
            .lock()
            .unwrap()
            .push((thread_id.to_string(), outputs.to_vec()));
        self.next_run()
    }

    async fn latest_assistant_reply(
        &self,
        _thread_id: &str,
    ) -> Result<Option<String>, AssistantError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AssistantError::unknown("No scripted reply queued")))
    }
}
