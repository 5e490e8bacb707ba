//! In-process transport with scripted streams and recorded side effects.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio_stream::StreamExt;

use super::{
    ContentType, Conversation, GroupHandle, Member, Message, MessageStream, Result, Transport,
    TransportError,
};

/// What the next `stream_messages` call does.
#[derive(Clone, Debug)]
pub enum StreamScript {
    /// Opening the stream fails.
    Fail(String),
    /// Deliver the messages, then end cleanly.
    Deliver(Vec<Message>),
    /// Deliver the messages, then fail.
    Interrupt(Vec<Message>, String),
    /// Deliver the messages, then stay open forever.
    Hold(Vec<Message>),
}

#[derive(Default)]
struct State {
    conversations: HashMap<String, Conversation>,
    members: HashMap<String, Vec<Member>>,
    super_admins: HashMap<String, Vec<String>>,
    sent: Vec<(String, String)>,
    scripts: VecDeque<StreamScript>,
    stream_opens: usize,
    member_mutations: usize,
    created_groups: Vec<String>,
    failing_sends: HashSet<String>,
    failing_adds: HashSet<String>,
}

#[derive(Clone)]
pub struct MemoryTransport {
    inbox_id: String,
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    pub fn new(inbox_id: impl Into<String>) -> Self {
        Self {
            inbox_id: inbox_id.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // Poisoning only happens if a test already panicked.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_direct(&self, id: &str) -> Conversation {
        let conversation = Conversation::direct(id);
        self.state()
            .conversations
            .insert(id.to_string(), conversation.clone());
        conversation
    }

    pub fn add_group(&self, id: &str, name: &str) -> GroupHandle {
        let handle = GroupHandle {
            id: id.to_string(),
            name: name.to_string(),
        };
        let mut state = self.state();
        state
            .conversations
            .insert(id.to_string(), Conversation::group(handle.clone()));
        state.members.entry(id.to_string()).or_default();
        handle
    }

    /// Seed a member without counting it as a mutation.
    pub fn seed_member(&self, group_id: &str, member: Member) {
        self.state()
            .members
            .entry(group_id.to_string())
            .or_default()
            .push(member);
    }

    pub fn push_stream(&self, script: StreamScript) {
        self.state().scripts.push_back(script);
    }

    pub fn fail_sends_to(&self, conversation_id: &str) {
        self.state().failing_sends.insert(conversation_id.to_string());
    }

    pub fn fail_adds_to(&self, group_id: &str) {
        self.state().failing_adds.insert(group_id.to_string());
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.state().sent.clone()
    }

    pub fn sent_to(&self, conversation_id: &str) -> Vec<String> {
        self.state()
            .sent
            .iter()
            .filter(|(id, _)| id == conversation_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn members_of(&self, group_id: &str) -> Vec<Member> {
        self.state().members.get(group_id).cloned().unwrap_or_default()
    }

    pub fn super_admins_of(&self, group_id: &str) -> Vec<String> {
        self.state()
            .super_admins
            .get(group_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stream_opens(&self) -> usize {
        self.state().stream_opens
    }

    /// Count of `add_members` and `add_super_admin` calls that changed state.
    pub fn member_mutations(&self) -> usize {
        self.state().member_mutations
    }

    pub fn created_groups(&self) -> Vec<String> {
        self.state().created_groups.clone()
    }

    /// Build a text message.
    pub fn text_message(sender: &str, conversation_id: &str, text: &str) -> Message {
        Message {
            id: ulid::Ulid::new().to_string(),
            sender_inbox_id: sender.to_string(),
            conversation_id: conversation_id.to_string(),
            content_type: ContentType::text(),
            content: serde_json::Value::String(text.to_string()),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn inbox_id(&self) -> &str {
        &self.inbox_id
    }

    async fn sync(&self) -> Result<()> {
        Ok(())
    }

    async fn stream_messages(&self) -> Result<MessageStream> {
        let script = {
            let mut state = self.state();
            state.stream_opens += 1;
            state.scripts.pop_front()
        };

        let Some(script) = script else {
            return Err(TransportError::Connect("no stream scripted".to_string()));
        };

        let stream: MessageStream = match script {
            StreamScript::Fail(reason) => return Err(TransportError::Connect(reason)),
            StreamScript::Deliver(messages) => {
                Box::pin(tokio_stream::iter(messages.into_iter().map(Ok::<_, TransportError>)))
            }
            StreamScript::Interrupt(messages, reason) => {
                let items = messages
                    .into_iter()
                    .map(Ok::<_, TransportError>)
                    .chain(std::iter::once(Err(TransportError::Stream(reason))));
                Box::pin(tokio_stream::iter(items))
            }
            StreamScript::Hold(messages) => Box::pin(
                tokio_stream::iter(messages.into_iter().map(Ok::<_, TransportError>))
                    .chain(tokio_stream::pending()),
            ),
        };
        Ok(stream)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.state().conversations.get(id).cloned())
    }

    async fn send(&self, conversation_id: &str, text: &str) -> Result<()> {
        let mut state = self.state();
        if state.failing_sends.contains(conversation_id) {
            return Err(TransportError::Request(format!(
                "send to {} rejected",
                conversation_id
            )));
        }
        if !state.conversations.contains_key(conversation_id) {
            return Err(TransportError::NotFound(conversation_id.to_string()));
        }
        state
            .sent
            .push((conversation_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<GroupHandle>> {
        let mut groups: Vec<GroupHandle> = self
            .state()
            .conversations
            .values()
            .filter_map(|c| c.as_group().cloned())
            .collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(groups)
    }

    async fn create_group(&self, name: &str) -> Result<GroupHandle> {
        let id = format!("group-{}", ulid::Ulid::new());
        let handle = self.add_group(&id, name);
        let mut state = self.state();
        state.created_groups.push(name.to_string());
        let me = Member::new(self.inbox_id.clone());
        state.members.entry(id.clone()).or_default().push(me);
        state
            .super_admins
            .entry(id)
            .or_default()
            .push(self.inbox_id.clone());
        Ok(handle)
    }

    async fn list_members(&self, group: &GroupHandle) -> Result<Vec<Member>> {
        self.state()
            .members
            .get(&group.id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(group.id.clone()))
    }

    async fn add_members(&self, group: &GroupHandle, inbox_ids: &[String]) -> Result<()> {
        let mut state = self.state();
        if state.failing_adds.contains(&group.id) {
            return Err(TransportError::Request(format!(
                "add to {} rejected",
                group.id
            )));
        }
        let members = state
            .members
            .get_mut(&group.id)
            .ok_or_else(|| TransportError::NotFound(group.id.clone()))?;
        for id in inbox_ids {
            if !members.iter().any(|m| m.matches(id)) {
                members.push(Member::new(id.clone()));
            }
        }
        state.member_mutations += 1;
        Ok(())
    }

    async fn list_super_admins(&self, group: &GroupHandle) -> Result<Vec<String>> {
        Ok(self
            .state()
            .super_admins
            .get(&group.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_super_admin(&self, group: &GroupHandle, inbox_id: &str) -> Result<()> {
        let mut state = self.state();
        let admins = state.super_admins.entry(group.id.clone()).or_default();
        if !admins.iter().any(|a| a.eq_ignore_ascii_case(inbox_id)) {
            admins.push(inbox_id.to_string());
        }
        state.member_mutations += 1;
        Ok(())
    }
}
