//! Rules engine — evaluates rules against messages and drives dispatch.
//!
//! Every matching rule fires. Rules are independent: there is no
//! first-match cutoff and no chaining, only load order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::MailError;
use crate::rules::field::{Envelope, MessageView};
use crate::rules::model::{Action, Aggregate, Rule};

/// Executes actions against the mailbox. Implemented by `MailDispatcher`.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, message_id: &str, action: &Action) -> Result<(), MailError>;
}

/// A single dispatch that failed. The run continues past it.
#[derive(Debug)]
pub struct DispatchFailure {
    pub message_id: String,
    /// Index of the rule (in load order) that produced the action.
    pub rule_index: usize,
    pub action: Action,
    pub error: MailError,
}

/// Outcome of an engine run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub messages_evaluated: usize,
    /// (message, rule) pairs that matched.
    pub rules_matched: usize,
    pub actions_dispatched: usize,
    /// Read-state the engine mirrored after successful dispatch, in order.
    /// Callers that persist messages apply these to the store.
    pub read_state_changes: Vec<(String, bool)>,
    pub failures: Vec<DispatchFailure>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Evaluates a fixed, validated rule set.
pub struct RulesEngine {
    rules: Vec<Rule>,
}

impl RulesEngine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Whether `rule` applies to the message.
    ///
    /// `All` over no conditions is true, `Any` over no conditions is false.
    pub fn applies(rule: &Rule, view: &MessageView<'_>, now: DateTime<Utc>) -> bool {
        match rule.predicate {
            Aggregate::All => rule.conditions.iter().all(|c| c.evaluate(view, now)),
            Aggregate::Any => rule.conditions.iter().any(|c| c.evaluate(view, now)),
        }
    }

    /// The actions a matched rule yields, in declared order.
    pub fn resolve(rule: &Rule) -> &[Action] {
        &rule.actions
    }

    /// Rules that match, with their load-order index.
    fn matched_rules(&self, view: &MessageView<'_>, now: DateTime<Utc>) -> Vec<(usize, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| Self::applies(rule, view, now))
            .collect()
    }

    /// Actions for one message without dispatching them: every matching
    /// rule's actions, in rule load order.
    pub fn matching_actions(&self, view: &MessageView<'_>, now: DateTime<Utc>) -> Vec<Action> {
        self.matched_rules(view, now)
            .into_iter()
            .flat_map(|(_, rule)| Self::resolve(rule).iter().cloned())
            .collect()
    }

    /// Evaluate all rules against all messages and dispatch matched actions.
    ///
    /// Messages are processed one at a time. A failed dispatch is logged and
    /// recorded in the report; the run moves on to the next action.
    pub async fn run<E: Envelope>(
        &self,
        messages: &mut [E],
        dispatcher: &dyn ActionDispatcher,
    ) -> RunReport {
        let now = Utc::now();
        let mut report = RunReport::default();

        for message in messages.iter_mut() {
            report.messages_evaluated += 1;

            let matched = self.matched_rules(&message.view(), now);
            for (rule_index, rule) in matched {
                report.rules_matched += 1;
                debug!(
                    message_id = message.id(),
                    rule = rule_index,
                    name = rule.name.as_deref().unwrap_or(""),
                    "Rule matched"
                );

                for action in Self::resolve(rule) {
                    match dispatcher.dispatch(message.id(), action).await {
                        Ok(()) => {
                            report.actions_dispatched += 1;
                            if let Some(read) = action.read_state() {
                                message.set_read(read);
                                report
                                    .read_state_changes
                                    .push((message.id().to_string(), read));
                            }
                        }
                        Err(error) => {
                            warn!(
                                message_id = message.id(),
                                rule = rule_index,
                                action = action.label(),
                                error = %error,
                                "Action dispatch failed"
                            );
                            report.failures.push(DispatchFailure {
                                message_id: message.id().to_string(),
                                rule_index,
                                action: action.clone(),
                                error,
                            });
                        }
                    }
                }
            }
        }

        info!(
            messages = report.messages_evaluated,
            matched = report.rules_matched,
            dispatched = report.actions_dispatched,
            failed = report.failures.len(),
            "Rules run complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::mail::types::{Header, HeaderMessage, Message};
    use crate::rules::model::{AgeUnit, Condition, DatePredicate, StringPredicate, TextField};

    /// Records every dispatch; fails the ones listed in `fail_on`.
    #[derive(Default)]
    struct RecordingDispatcher {
        calls: Mutex<Vec<(String, Action)>>,
        fail_on: Vec<(String, Action)>,
    }

    #[async_trait]
    impl ActionDispatcher for RecordingDispatcher {
        async fn dispatch(&self, message_id: &str, action: &Action) -> Result<(), MailError> {
            self.calls
                .lock()
                .unwrap()
                .push((message_id.to_string(), action.clone()));
            if self
                .fail_on
                .iter()
                .any(|(id, a)| id == message_id && a == action)
            {
                return Err(MailError::Http("connection reset".into()));
            }
            Ok(())
        }
    }

    fn move_to(label: &str) -> Action {
        Action::MoveMessage {
            destination: label.into(),
        }
    }

    fn sender_contains(value: &str) -> Condition {
        Condition::text(TextField::Sender, StringPredicate::Contains, value)
    }

    #[test]
    fn empty_all_is_true_empty_any_is_false() {
        let msg = Message::new("1");
        let view = MessageView::Flat(&msg);
        let now = Utc::now();
        assert!(RulesEngine::applies(&Rule::new(Aggregate::All), &view, now));
        assert!(!RulesEngine::applies(&Rule::new(Aggregate::Any), &view, now));
    }

    #[test]
    fn all_and_any_aggregation() {
        let msg = Message::new("1")
            .with_sender("hr@tenmiles.com")
            .with_subject("Interview");
        let view = MessageView::Flat(&msg);
        let now = Utc::now();
        let miss = Condition::text(TextField::Subject, StringPredicate::Equals, "invoice");

        let all = Rule::new(Aggregate::All)
            .with_condition(sender_contains("tenmiles"))
            .with_condition(miss.clone());
        assert!(!RulesEngine::applies(&all, &view, now));

        let any = Rule::new(Aggregate::Any)
            .with_condition(sender_contains("tenmiles"))
            .with_condition(miss);
        assert!(RulesEngine::applies(&any, &view, now));
    }

    #[test]
    fn matching_actions_follow_rule_order() {
        let engine = RulesEngine::new(vec![
            Rule::new(Aggregate::All)
                .with_condition(sender_contains("tenmiles"))
                .with_action(move_to("Work"))
                .with_action(Action::MarkAsRead),
            Rule::new(Aggregate::Any).with_condition(sender_contains("nobody")),
            Rule::new(Aggregate::All).with_action(Action::MarkAsUnread),
        ]);
        let msg = Message::new("1").with_sender("hr@tenmiles.com");
        let actions = engine.matching_actions(&MessageView::Flat(&msg), Utc::now());
        assert_eq!(
            actions,
            vec![move_to("Work"), Action::MarkAsRead, Action::MarkAsUnread]
        );
    }

    #[tokio::test]
    async fn run_dispatches_in_declared_order() {
        let engine = RulesEngine::new(vec![
            Rule::new(Aggregate::All)
                .with_condition(sender_contains("tenmiles.com"))
                .with_action(move_to("INBOX"))
                .with_action(Action::MarkAsRead),
        ]);
        let mut messages = vec![
            Message::new("m1")
                .with_sender("hr@tenmiles.com")
                .with_subject("Interview"),
        ];
        let dispatcher = RecordingDispatcher::default();

        let report = engine.run(&mut messages, &dispatcher).await;

        let calls = dispatcher.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("m1".to_string(), move_to("INBOX")),
                ("m1".to_string(), Action::MarkAsRead),
            ]
        );
        assert!(messages[0].is_read);
        assert_eq!(report.read_state_changes, vec![("m1".to_string(), true)]);
        assert_eq!(report.actions_dispatched, 2);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn one_batch_per_matching_message() {
        let engine = RulesEngine::new(vec![
            Rule::new(Aggregate::Any)
                .with_condition(sender_contains("@corp.com"))
                .with_action(move_to("Corp")),
            Rule::new(Aggregate::All)
                .with_condition(Condition::age(DatePredicate::GreaterThan, 30, AgeUnit::Days))
                .with_action(Action::MarkAsRead),
        ]);
        let old = (Utc::now() - chrono::Duration::days(60)).to_rfc2822();
        let mut messages = vec![
            Message::new("a").with_sender("x@corp.com").with_date(old.clone()),
            Message::new("b").with_sender("y@else.com"),
            Message::new("c").with_sender("z@corp.com"),
        ];
        let dispatcher = RecordingDispatcher::default();

        let report = engine.run(&mut messages, &dispatcher).await;

        let calls = dispatcher.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("a".to_string(), move_to("Corp")),
                ("a".to_string(), Action::MarkAsRead),
                ("c".to_string(), move_to("Corp")),
            ]
        );
        assert_eq!(report.messages_evaluated, 3);
        assert_eq!(report.rules_matched, 3);
    }

    #[tokio::test]
    async fn dispatch_failure_does_not_abort_batch() {
        let engine = RulesEngine::new(vec![
            Rule::new(Aggregate::All)
                .with_action(Action::MarkAsRead)
                .with_action(move_to("Archive")),
        ]);
        let mut messages = vec![Message::new("m1"), Message::new("m2")];
        let dispatcher = RecordingDispatcher {
            fail_on: vec![("m1".to_string(), Action::MarkAsRead)],
            ..Default::default()
        };

        let report = engine.run(&mut messages, &dispatcher).await;

        assert_eq!(dispatcher.calls.lock().unwrap().len(), 4);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.message_id, "m1");
        assert_eq!(failure.rule_index, 0);
        assert_eq!(failure.action, Action::MarkAsRead);
        assert!(matches!(failure.error, MailError::Http(_)));

        // Read-state only mirrors successful dispatches.
        assert!(!messages[0].is_read);
        assert!(messages[1].is_read);
        assert_eq!(report.read_state_changes, vec![("m2".to_string(), true)]);
        assert_eq!(report.actions_dispatched, 3);
    }

    #[tokio::test]
    async fn run_over_header_messages_mirrors_unread_label() {
        let engine = RulesEngine::new(vec![
            Rule::new(Aggregate::All)
                .with_condition(sender_contains("tenmiles.com"))
                .with_condition(Condition::text(
                    TextField::Subject,
                    StringPredicate::Contains,
                    "interview",
                ))
                .with_action(move_to("Interviews"))
                .with_action(Action::MarkAsRead),
        ]);
        let header_message = |id: &str, from: &str| HeaderMessage {
            id: id.into(),
            headers: vec![
                Header::new("from", from),
                Header::new("subject", "Interview slot"),
            ],
            body: None,
            label_ids: vec!["INBOX".into(), "UNREAD".into()],
            internal_date: None,
        };
        let mut messages = vec![
            header_message("h1", "HR <hr@tenmiles.com>"),
            header_message("h2", "someone@else.com"),
        ];
        let dispatcher = RecordingDispatcher::default();

        let report = engine.run(&mut messages, &dispatcher).await;

        assert_eq!(
            dispatcher.calls.lock().unwrap().clone(),
            vec![
                ("h1".to_string(), move_to("Interviews")),
                ("h1".to_string(), Action::MarkAsRead),
            ]
        );
        assert_eq!(messages[0].label_ids, vec!["INBOX".to_string()]);
        assert!(messages[0].is_read());
        assert_eq!(
            messages[1].label_ids,
            vec!["INBOX".to_string(), "UNREAD".to_string()]
        );
        assert_eq!(report.read_state_changes, vec![("h1".to_string(), true)]);
    }

    #[tokio::test]
    async fn no_rules_no_dispatch() {
        let engine = RulesEngine::new(Vec::new());
        let mut messages = vec![Message::new("m1")];
        let dispatcher = RecordingDispatcher::default();
        let report = engine.run(&mut messages, &dispatcher).await;
        assert!(dispatcher.calls.lock().unwrap().is_empty());
        assert_eq!(report.messages_evaluated, 1);
        assert_eq!(report.rules_matched, 0);
    }
}
