//! Client-side cache of a user's conversations and the open thread.
//!
//! Realtime events patch only the conversation they name. Fetches are tagged
//! with a [`FetchTicket`]; a result whose ticket no longer matches the open
//! thread is dropped, so a slow response cannot overwrite a newer view.

use std::cmp::Ordering;

use uuid::Uuid;

use crate::events::RealtimeEvent;
use crate::models::{ConversationView, MessageView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    conversation_id: Uuid,
    generation: u64,
}

impl FetchTicket {
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }
}

/// What an applied event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxChange {
    Unchanged,
    /// List metadata (ordering, unread count, read state) changed.
    ConversationPatched(Uuid),
    /// The open thread gained or updated a message.
    ThreadPatched(Uuid),
    /// The event names a conversation the cache has never seen; refetch the list.
    NeedsRefresh,
}

#[derive(Debug)]
struct Thread {
    conversation_id: Uuid,
    generation: u64,
    loaded: bool,
    /// Before the fetch lands this holds only messages delivered by events.
    messages: Vec<MessageView>,
}

impl Thread {
    fn insert(&mut self, message: &MessageView) -> bool {
        if self.messages.iter().any(|m| m.message.id == message.message.id) {
            return false;
        }
        let created_at = message.message.created_at;
        let at = self.messages.partition_point(|m| m.message.created_at <= created_at);
        self.messages.insert(at, message.clone());
        true
    }
}

#[derive(Debug)]
pub struct Inbox {
    user_id: Uuid,
    conversations: Vec<ConversationView>,
    thread: Option<Thread>,
    next_generation: u64,
}

impl Inbox {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            conversations: Vec::new(),
            thread: None,
            next_generation: 0,
        }
    }

    pub fn conversations(&self) -> &[ConversationView] {
        &self.conversations
    }

    pub fn conversation(&self, id: Uuid) -> Option<&ConversationView> {
        self.conversations.iter().find(|c| c.conversation.id == id)
    }

    pub fn replace_conversations(&mut self, mut conversations: Vec<ConversationView>) {
        conversations.sort_by(by_activity);
        self.conversations = conversations;
    }

    /// Open a thread and return the ticket its fetch must be applied with.
    /// Any previously open thread is discarded.
    pub fn open(&mut self, conversation_id: Uuid) -> FetchTicket {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.thread = Some(Thread {
            conversation_id,
            generation,
            loaded: false,
            messages: Vec::new(),
        });
        FetchTicket {
            conversation_id,
            generation,
        }
    }

    pub fn close(&mut self) {
        self.thread = None;
    }

    pub fn open_conversation(&self) -> Option<Uuid> {
        self.thread.as_ref().map(|t| t.conversation_id)
    }

    /// Messages of the open thread, once its fetch has landed.
    pub fn thread_messages(&self) -> Option<&[MessageView]> {
        self.thread
            .as_ref()
            .filter(|t| t.loaded)
            .map(|t| t.messages.as_slice())
    }

    /// Install a fetch result, merging in anything events delivered while it
    /// was in flight. Returns `false` when the ticket is stale.
    pub fn apply_messages(&mut self, ticket: FetchTicket, mut messages: Vec<MessageView>) -> bool {
        match self.thread.as_mut() {
            Some(thread)
                if thread.generation == ticket.generation
                    && thread.conversation_id == ticket.conversation_id =>
            {
                for early in std::mem::take(&mut thread.messages) {
                    match messages.iter_mut().find(|m| m.message.id == early.message.id) {
                        Some(fetched) => {
                            if fetched.message.read_at.is_none() {
                                fetched.message.read_at = early.message.read_at;
                            }
                        }
                        None => messages.push(early),
                    }
                }
                messages.sort_by_key(|m| m.message.created_at);
                thread.messages = messages;
                thread.loaded = true;
                true
            }
            _ => false,
        }
    }

    pub fn apply_event(&mut self, event: &RealtimeEvent) -> InboxChange {
        match event {
            RealtimeEvent::MessageCreate {
                conversation_id,
                message,
            } => self.apply_message_create(*conversation_id, message),
            RealtimeEvent::MessageRead {
                conversation_id,
                message_id,
                reader_id,
                read_at,
            } => self.apply_message_read(*conversation_id, *message_id, *reader_id, *read_at),
            RealtimeEvent::Ready { .. } | RealtimeEvent::SubmissionUpdated { .. } => InboxChange::Unchanged,
        }
    }

    fn open_thread(&mut self, conversation_id: Uuid) -> Option<&mut Thread> {
        self.thread.as_mut().filter(|t| t.conversation_id == conversation_id)
    }

    fn apply_message_create(&mut self, conversation_id: Uuid, message: &MessageView) -> InboxChange {
        let Some(idx) = self
            .conversations
            .iter()
            .position(|c| c.conversation.id == conversation_id)
        else {
            return InboxChange::NeedsRefresh;
        };

        let (fresh, thread_loaded) = match self.open_thread(conversation_id) {
            Some(thread) => (thread.insert(message), thread.loaded),
            None => (true, false),
        };
        let created_at = message.message.created_at;

        // Counted exactly as the server counts: unread until marked read,
        // whether or not the thread is on screen.
        let entry = &mut self.conversations[idx];
        if entry.conversation.last_message_at.is_none_or(|at| at < created_at) {
            entry.conversation.last_message_at = Some(created_at);
        }
        if fresh && message.message.recipient_id == self.user_id && message.message.read_at.is_none() {
            entry.unread_count += 1;
        }
        self.conversations.sort_by(by_activity);

        if thread_loaded {
            InboxChange::ThreadPatched(conversation_id)
        } else {
            InboxChange::ConversationPatched(conversation_id)
        }
    }

    fn apply_message_read(
        &mut self,
        conversation_id: Uuid,
        message_id: Uuid,
        reader_id: Uuid,
        read_at: chrono::DateTime<chrono::Utc>,
    ) -> InboxChange {
        let Some(idx) = self
            .conversations
            .iter()
            .position(|c| c.conversation.id == conversation_id)
        else {
            return InboxChange::Unchanged;
        };

        // A message we have not seen is assumed counted unless the loaded
        // thread proves it does not exist.
        let mut counted = true;
        let mut thread_patched = false;
        if let Some(thread) = self.open_thread(conversation_id) {
            let loaded = thread.loaded;
            match thread.messages.iter_mut().find(|m| m.message.id == message_id) {
                Some(m) => {
                    counted = m.message.read_at.is_none();
                    if counted {
                        m.message.read_at = Some(read_at);
                        thread_patched = loaded;
                    }
                }
                None => counted = !loaded,
            }
        }

        if reader_id == self.user_id && counted {
            let entry = &mut self.conversations[idx];
            entry.unread_count = entry.unread_count.saturating_sub(1);
        }

        if thread_patched {
            InboxChange::ThreadPatched(conversation_id)
        } else {
            InboxChange::ConversationPatched(conversation_id)
        }
    }
}

/// Most recent activity first; conversations without messages sort last,
/// newest-created first among themselves.
pub fn by_activity(a: &ConversationView, b: &ConversationView) -> Ordering {
    let (a, b) = (&a.conversation, &b.conversation);
    match (a.last_message_at, b.last_message_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.created_at.cmp(&a.created_at))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::*;
    use crate::models::{Conversation, Message, ProfileSummary};

    fn conversation(me: Uuid, last: Option<DateTime<Utc>>) -> ConversationView {
        let created = Utc::now() - Duration::days(1);
        ConversationView {
            conversation: Conversation {
                id: Uuid::new_v4(),
                campaign_id: Uuid::new_v4(),
                pac_user_id: me,
                influencer_user_id: Uuid::new_v4(),
                last_message_at: last,
                created_at: created,
                updated_at: created,
            },
            campaign_name: Some("Turnout".into()),
            pac_profile: ProfileSummary::default(),
            influencer_profile: ProfileSummary::default(),
            unread_count: 0,
        }
    }

    fn message_to(conv: &ConversationView, recipient: Uuid, at: DateTime<Utc>) -> MessageView {
        let c = &conv.conversation;
        let sender = c.counterpart_of(recipient).unwrap();
        MessageView {
            message: Message {
                id: Uuid::new_v4(),
                campaign_id: c.campaign_id,
                sender_id: sender,
                recipient_id: recipient,
                subject: None,
                content: "hello".into(),
                read_at: None,
                created_at: at,
                updated_at: at,
            },
            sender_profile: ProfileSummary::default(),
            recipient_profile: ProfileSummary::default(),
        }
    }

    fn create(conv: &ConversationView, message: MessageView) -> RealtimeEvent {
        RealtimeEvent::MessageCreate {
            conversation_id: conv.conversation.id,
            message,
        }
    }

    #[test]
    fn list_is_ordered_by_activity_with_silent_conversations_last() {
        let me = Uuid::new_v4();
        let now = Utc::now();
        let silent = conversation(me, None);
        let old = conversation(me, Some(now - Duration::hours(2)));
        let fresh = conversation(me, Some(now));

        let mut inbox = Inbox::new(me);
        inbox.replace_conversations(vec![silent.clone(), old.clone(), fresh.clone()]);

        let ids: Vec<Uuid> = inbox.conversations().iter().map(|c| c.conversation.id).collect();
        assert_eq!(ids, vec![fresh.conversation.id, old.conversation.id, silent.conversation.id]);
    }

    #[test]
    fn new_message_moves_conversation_up_and_counts_unread() {
        let me = Uuid::new_v4();
        let now = Utc::now();
        let a = conversation(me, Some(now - Duration::hours(1)));
        let b = conversation(me, Some(now - Duration::hours(3)));

        let mut inbox = Inbox::new(me);
        inbox.replace_conversations(vec![a.clone(), b.clone()]);

        let change = inbox.apply_event(&create(&b, message_to(&b, me, now)));
        assert_eq!(change, InboxChange::ConversationPatched(b.conversation.id));
        assert_eq!(inbox.conversations()[0].conversation.id, b.conversation.id);
        assert_eq!(inbox.conversations()[0].unread_count, 1);
        assert_eq!(inbox.conversations()[1].unread_count, 0);
    }

    #[test]
    fn unknown_conversation_requests_refresh() {
        let me = Uuid::new_v4();
        let known = conversation(me, None);
        let unknown = conversation(me, None);

        let mut inbox = Inbox::new(me);
        inbox.replace_conversations(vec![known]);

        let change = inbox.apply_event(&create(&unknown, message_to(&unknown, me, Utc::now())));
        assert_eq!(change, InboxChange::NeedsRefresh);
    }

    #[test]
    fn stale_fetch_is_ignored() {
        let me = Uuid::new_v4();
        let a = conversation(me, None);
        let b = conversation(me, None);

        let mut inbox = Inbox::new(me);
        inbox.replace_conversations(vec![a.clone(), b.clone()]);

        let first = inbox.open(a.conversation.id);
        let second = inbox.open(b.conversation.id);

        let late = vec![message_to(&a, me, Utc::now())];
        assert!(!inbox.apply_messages(first, late));
        assert!(inbox.thread_messages().is_none());

        assert!(inbox.apply_messages(second, vec![]));
        assert_eq!(inbox.thread_messages().map(|m| m.len()), Some(0));

        inbox.close();
        assert!(!inbox.apply_messages(second, vec![]));
    }

    #[test]
    fn open_thread_is_patched_in_order_without_duplicates() {
        let me = Uuid::new_v4();
        let now = Utc::now();
        let conv = conversation(me, Some(now - Duration::minutes(5)));

        let mut inbox = Inbox::new(me);
        inbox.replace_conversations(vec![conv.clone()]);
        let ticket = inbox.open(conv.conversation.id);
        let earlier = message_to(&conv, me, now - Duration::minutes(5));
        inbox.apply_messages(ticket, vec![earlier.clone()]);

        let incoming = message_to(&conv, me, now);
        let event = create(&conv, incoming.clone());
        assert_eq!(inbox.apply_event(&event), InboxChange::ThreadPatched(conv.conversation.id));
        assert_eq!(inbox.apply_event(&event), InboxChange::ThreadPatched(conv.conversation.id));

        let thread = inbox.thread_messages().unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].message.id, earlier.message.id);
        assert_eq!(thread[1].message.id, incoming.message.id);
        // Unread until marked read, even while on screen.
        assert_eq!(inbox.conversations()[0].unread_count, 1);
    }

    #[test]
    fn own_read_receipt_clears_unread_once() {
        let me = Uuid::new_v4();
        let now = Utc::now();
        let conv = conversation(me, None);

        let mut inbox = Inbox::new(me);
        inbox.replace_conversations(vec![conv.clone()]);
        let msg = message_to(&conv, me, now);
        inbox.apply_event(&create(&conv, msg.clone()));
        assert_eq!(inbox.conversations()[0].unread_count, 1);

        let ticket = inbox.open(conv.conversation.id);
        inbox.apply_messages(ticket, vec![msg.clone()]);

        let read = RealtimeEvent::MessageRead {
            conversation_id: conv.conversation.id,
            message_id: msg.message.id,
            reader_id: me,
            read_at: now,
        };
        assert_eq!(inbox.apply_event(&read), InboxChange::ThreadPatched(conv.conversation.id));
        assert_eq!(inbox.conversations()[0].unread_count, 0);
        assert_eq!(inbox.thread_messages().unwrap()[0].message.read_at, Some(now));

        // A repeated receipt for an already-read message changes nothing.
        assert_eq!(inbox.apply_event(&read), InboxChange::ConversationPatched(conv.conversation.id));
        assert_eq!(inbox.conversations()[0].unread_count, 0);
    }

    fn read_by(conv: &ConversationView, msg: &MessageView, reader: Uuid) -> RealtimeEvent {
        RealtimeEvent::MessageRead {
            conversation_id: conv.conversation.id,
            message_id: msg.message.id,
            reader_id: reader,
            read_at: Utc::now(),
        }
    }

    #[test]
    fn reading_a_message_seen_while_viewing_keeps_the_others_unread() {
        let me = Uuid::new_v4();
        let now = Utc::now();
        let conv = conversation(me, None);

        let mut inbox = Inbox::new(me);
        inbox.replace_conversations(vec![conv.clone()]);
        let first = message_to(&conv, me, now - Duration::minutes(1));
        inbox.apply_event(&create(&conv, first.clone()));

        let ticket = inbox.open(conv.conversation.id);
        inbox.apply_messages(ticket, vec![first.clone()]);
        let second = message_to(&conv, me, now);
        inbox.apply_event(&create(&conv, second.clone()));
        assert_eq!(inbox.conversations()[0].unread_count, 2);

        inbox.apply_event(&read_by(&conv, &second, me));
        assert_eq!(inbox.conversations()[0].unread_count, 1);

        inbox.apply_event(&read_by(&conv, &first, me));
        assert_eq!(inbox.conversations()[0].unread_count, 0);
    }

    #[test]
    fn messages_arriving_before_the_fetch_lands_are_kept() {
        let me = Uuid::new_v4();
        let now = Utc::now();
        let conv = conversation(me, None);

        let mut inbox = Inbox::new(me);
        inbox.replace_conversations(vec![conv.clone()]);
        let ticket = inbox.open(conv.conversation.id);

        let older = message_to(&conv, me, now - Duration::minutes(1));
        let early = message_to(&conv, me, now);
        let change = inbox.apply_event(&create(&conv, early.clone()));
        assert_eq!(change, InboxChange::ConversationPatched(conv.conversation.id));
        assert!(inbox.thread_messages().is_none());

        // The fetch ran before the insert, so it only knows the older message.
        assert!(inbox.apply_messages(ticket, vec![older.clone()]));
        let ids: Vec<Uuid> = inbox.thread_messages().unwrap().iter().map(|m| m.message.id).collect();
        assert_eq!(ids, vec![older.message.id, early.message.id]);
    }

    #[test]
    fn read_receipts_for_sent_messages_leave_the_badge_alone() {
        let me = Uuid::new_v4();
        let conv = conversation(me, None);
        let them = conv.conversation.influencer_user_id;

        let mut inbox = Inbox::new(me);
        inbox.replace_conversations(vec![conv.clone()]);
        inbox.apply_event(&create(&conv, message_to(&conv, me, Utc::now())));

        let sent = message_to(&conv, them, Utc::now());
        inbox.apply_event(&create(&conv, sent.clone()));
        inbox.apply_event(&read_by(&conv, &sent, them));
        assert_eq!(inbox.conversations()[0].unread_count, 1);
    }
}
