use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent::AgentRunResponseUpdate;
use crate::error::WorkflowError;
use crate::llm::{ChatClient, ChatMessage, ChatOptions, Role};
use crate::workflow::{Executor, Message, TypeKey, WorkflowContext, WorkflowEvent};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const REGENERATE_INSTRUCTION: &str =
    "Please incorporate the feedback and regenerate the response.";
pub const APPROVED_FEEDBACK: &str = "OK";

/// A draft awaiting review.
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewRequest {
    pub request_id: String,
    pub user_messages: Vec<ChatMessage>,
    pub agent_messages: Vec<ChatMessage>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewResponse {
    pub request_id: String,
    pub feedback: String,
    pub approved: bool,
}

impl ReviewResponse {
    pub fn approve(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            feedback: APPROVED_FEEDBACK.to_string(),
            approved: true,
        }
    }

    pub fn reject(request_id: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            feedback: feedback.into(),
            approved: false,
        }
    }
}

fn log_request(reviewer: &str, request: &ReviewRequest) {
    let last_text = |messages: &[ChatMessage]| messages.last().map(ChatMessage::text);
    tracing::info!(
        reviewer,
        request_id = %request.request_id,
        user = ?last_text(&request.user_messages),
        draft = ?last_text(&request.agent_messages),
        "reviewing draft"
    );
}

/// Approves every draft.
pub struct AutoApprover {
    id: String,
}

impl AutoApprover {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Executor for AutoApprover {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<ReviewRequest>()]
    }

    fn output_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<ReviewResponse>()]
    }

    async fn execute(
        &self,
        message: Message,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let request = message.require::<ReviewRequest>(&self.id)?;
        log_request(&self.id, request);
        ctx.send_message(ReviewResponse::approve(request.request_id.clone()));
        Ok(())
    }
}

/// Rejects the first draft it sees with fixed feedback and approves every
/// later one, whatever its content.
pub struct SecondApprover {
    id: String,
    feedback: String,
    reviews: AtomicUsize,
}

impl SecondApprover {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            feedback: "use easier words".to_string(),
            reviews: AtomicUsize::new(0),
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = feedback.into();
        self
    }

    pub fn reviews(&self) -> usize {
        self.reviews.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for SecondApprover {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<ReviewRequest>()]
    }

    fn output_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<ReviewResponse>()]
    }

    async fn execute(
        &self,
        message: Message,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let request = message.require::<ReviewRequest>(&self.id)?;
        log_request(&self.id, request);

        let previous = self.reviews.fetch_add(1, Ordering::SeqCst);
        let response = if previous == 0 {
            ReviewResponse::reject(request.request_id.clone(), self.feedback.clone())
        } else {
            ReviewResponse::approve(request.request_id.clone())
        };
        tracing::info!(
            reviewer = %self.id,
            approved = response.approved,
            feedback = %response.feedback,
            "review done"
        );
        ctx.send_message(response);
        Ok(())
    }
}

type Pending = HashMap<String, (ReviewRequest, Vec<ChatMessage>)>;

/// Drafts responses with a chat client and revises them until a reviewer
/// approves.
///
/// A `Vec<ChatMessage>` starts a new request; a [`ReviewResponse`] settles or
/// revises a pending one. Approved drafts are published as an
/// `AgentRunUpdate` event, so a workflow built around this executor can be
/// run as an agent.
pub struct Worker {
    id: String,
    client: Arc<dyn ChatClient>,
    system_prompt: String,
    pending: Mutex<Pending>,
}

impl Worker {
    pub fn new(id: impl Into<String>, client: Arc<dyn ChatClient>) -> Self {
        Self {
            id: id.into(),
            client,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Requests still waiting for a review response.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().expect("pending lock poisoned").len()
    }

    async fn draft(
        &self,
        request_id: String,
        user_messages: Vec<ChatMessage>,
        mut conversation: Vec<ChatMessage>,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let response = self
            .client
            .get_response(&conversation, &ChatOptions::default())
            .await?;
        tracing::info!(
            executor = %self.id,
            request_id = %request_id,
            draft = %response.text(),
            "draft generated"
        );

        conversation.extend(response.messages.iter().cloned());
        let request = ReviewRequest {
            request_id: request_id.clone(),
            user_messages,
            agent_messages: response.messages,
        };
        ctx.send_message(request.clone());
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(request_id, (request, conversation));
        Ok(())
    }

    async fn start(
        &self,
        user_messages: Vec<ChatMessage>,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let mut conversation = vec![ChatMessage::system(self.system_prompt.clone())];
        conversation.extend(user_messages.iter().cloned());
        let request_id = uuid::Uuid::new_v4().to_string();
        self.draft(request_id, user_messages, conversation, ctx).await
    }

    async fn settle(
        &self,
        review: &ReviewResponse,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let (request, mut conversation) = self
            .pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&review.request_id)
            .ok_or_else(|| WorkflowError::UnknownRequest(review.request_id.clone()))?;

        if review.approved {
            tracing::info!(executor = %self.id, request_id = %review.request_id, "draft approved");
            let contents = request
                .agent_messages
                .into_iter()
                .flat_map(|message| message.contents)
                .collect();
            ctx.add_event(WorkflowEvent::AgentRunUpdate {
                executor_id: self.id.clone(),
                update: AgentRunResponseUpdate {
                    role: Some(Role::Assistant),
                    contents,
                    author_name: Some(self.id.clone()),
                    response_id: Some(review.request_id.clone()),
                    ..AgentRunResponseUpdate::default()
                },
            });
            return Ok(());
        }

        tracing::info!(
            executor = %self.id,
            request_id = %review.request_id,
            feedback = %review.feedback,
            "draft rejected, regenerating"
        );
        conversation.push(ChatMessage::system(review.feedback.clone()));
        conversation.push(ChatMessage::system(REGENERATE_INSTRUCTION));
        conversation.extend(request.user_messages.iter().cloned());

        self.draft(request.request_id, request.user_messages, conversation, ctx)
            .await
    }
}

#[async_trait]
impl Executor for Worker {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> Vec<TypeKey> {
        vec![
            TypeKey::of::<Vec<ChatMessage>>(),
            TypeKey::of::<ReviewResponse>(),
        ]
    }

    fn output_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<ReviewRequest>()]
    }

    async fn execute(
        &self,
        message: Message,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        if let Some(review) = message.downcast_ref::<ReviewResponse>() {
            return self.settle(review, ctx).await;
        }
        let user_messages = message.require::<Vec<ChatMessage>>(&self.id)?.clone();
        self.start(user_messages, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::agent::Agent;
    use crate::error::ProviderError;
    use crate::llm::ChatResponse;
    use crate::workflow::{Workflow, WorkflowBuilder};

    struct ScriptedClient {
        replies: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedClient {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<Vec<ChatMessage>> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn get_response(
            &self,
            messages: &[ChatMessage],
            _options: &ChatOptions,
        ) -> Result<ChatResponse, ProviderError> {
            self.requests
                .lock()
                .expect("requests lock")
                .push(messages.to_vec());
            let reply = self
                .replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .ok_or_else(|| ProviderError::Response("no scripted reply left".to_string()))?;
            Ok(ChatResponse::from_message(ChatMessage::assistant(reply)))
        }
    }

    fn review_workflow(worker: Arc<dyn Executor>, reviewer: Arc<dyn Executor>) -> Workflow {
        WorkflowBuilder::new()
            .name("review")
            .add_edge(&worker, &reviewer)
            .add_edge(&reviewer, &worker)
            .set_start_executor(&worker)
            .build()
            .expect("workflow builds")
    }

    fn request(id: &str) -> ReviewRequest {
        ReviewRequest {
            request_id: id.to_string(),
            user_messages: vec![ChatMessage::user("hi")],
            agent_messages: vec![ChatMessage::assistant("draft")],
        }
    }

    #[tokio::test]
    async fn second_approver_rejects_only_the_first_review() {
        let approver = SecondApprover::new("reviewer");

        let mut verdicts = Vec::new();
        for id in ["a", "b", "c"] {
            let mut ctx = WorkflowContext::new("reviewer");
            approver
                .execute(Message::new(request(id)), &mut ctx)
                .await
                .expect("reviews");
            let sent = ctx.drain_messages();
            let response = sent[0].downcast::<ReviewResponse>().expect("review response");
            verdicts.push(response);
        }

        assert_eq!(verdicts[0], ReviewResponse::reject("a", "use easier words"));
        assert_eq!(verdicts[1], ReviewResponse::approve("b"));
        assert_eq!(verdicts[2], ReviewResponse::approve("c"));
        assert_eq!(approver.reviews(), 3);
    }

    #[tokio::test]
    async fn auto_approver_approves_with_ok() {
        let approver = AutoApprover::new("reviewer");
        let mut ctx = WorkflowContext::new("reviewer");

        approver
            .execute(Message::new(request("r-1")), &mut ctx)
            .await
            .expect("reviews");

        let sent = ctx.drain_messages();
        let response = sent[0].downcast::<ReviewResponse>().expect("review response");
        assert!(response.approved);
        assert_eq!(response.feedback, "OK");
    }

    #[tokio::test]
    async fn rejected_draft_is_regenerated_with_feedback() {
        let client = ScriptedClient::new(&["a complicated answer", "a simple answer"]);
        let worker = Arc::new(Worker::new("worker", client.clone()));
        let reviewer = Arc::new(SecondApprover::new("reviewer"));
        let workflow = review_workflow(worker.clone(), reviewer.clone());

        let result = workflow
            .run(vec![ChatMessage::user("explain tides")])
            .await
            .expect("run succeeds");

        let updates = result
            .events
            .iter()
            .filter_map(|event| match event {
                WorkflowEvent::AgentRunUpdate { update, .. } => Some(update.text()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(updates, vec!["a simple answer".to_string()]);
        assert_eq!(reviewer.reviews(), 2);
        assert_eq!(worker.pending_requests(), 0);

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0][0].role, Role::System);
        assert_eq!(requests[0][0].text(), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(requests[0][1].text(), "explain tides");

        let texts = requests[1].iter().map(ChatMessage::text).collect::<Vec<_>>();
        assert_eq!(
            texts,
            vec![
                DEFAULT_SYSTEM_PROMPT,
                "explain tides",
                "a complicated answer",
                "use easier words",
                REGENERATE_INSTRUCTION,
                "explain tides",
            ]
        );
    }

    #[tokio::test]
    async fn review_loop_runs_as_an_agent() {
        let client = ScriptedClient::new(&["first draft"]);
        let worker: Arc<dyn Executor> = Arc::new(Worker::new("worker", client));
        let reviewer: Arc<dyn Executor> = Arc::new(AutoApprover::new("reviewer"));
        let agent = review_workflow(worker, reviewer).as_agent();

        let response = agent
            .run(vec![ChatMessage::user("write a haiku")], None)
            .await
            .expect("agent run");

        assert_eq!(response.text(), "first draft");
        assert_eq!(response.messages.len(), 1);
        assert_eq!(response.messages[0].role, Role::Assistant);
    }

    #[tokio::test]
    async fn unknown_request_id_is_an_error() {
        let worker = Worker::new("worker", ScriptedClient::new(&[]));
        let mut ctx = WorkflowContext::new("worker");

        let err = worker
            .execute(Message::new(ReviewResponse::approve("missing")), &mut ctx)
            .await
            .expect_err("no such request");

        assert!(matches!(err, WorkflowError::UnknownRequest(id) if id == "missing"));
        assert!(ctx.drain_events().is_empty());
    }
}
