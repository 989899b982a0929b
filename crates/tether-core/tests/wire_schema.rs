//! JsonSchema validation of captured API payloads.
//!
//! Each fixture is a payload shape observed from the remote API. It must
//! deserialize into the matching type and validate against that type's
//! generated schema.

use schemars::schema_for;
use tether_core::entities::{Account, Agent};
use tether_core::enums::{AgentStatus, MessageKind};
use tether_core::responses::{AgentIdResponse, AgentList, Conversation, RepositoryList};

fn validate_against_schema(
    schema: &serde_json::Value,
    instance: &serde_json::Value,
) -> Vec<String> {
    let validator = jsonschema::validator_for(schema).expect("schema should be valid");
    validator
        .iter_errors(instance)
        .map(|e| format!("{e}"))
        .collect()
}

macro_rules! parse_and_validate {
    ($name:ident, $ty:ty, $fixture:expr, |$parsed:ident| $check:block) => {
        #[test]
        fn $name() {
            let instance: serde_json::Value = serde_json::from_str($fixture).unwrap();
            let $parsed: $ty = serde_json::from_value(instance.clone()).unwrap();
            $check

            let schema = serde_json::to_value(schema_for!($ty)).unwrap();
            let errors = validate_against_schema(&schema, &instance);
            assert!(
                errors.is_empty(),
                "Schema validation failed for {}: {:?}",
                stringify!($ty),
                errors
            );
        }
    };
}

parse_and_validate!(
    account_payload,
    Account,
    r#"{ "apiKeyName": "ci-key", "createdAt": "2024-01-15T10:30:00Z", "userEmail": "dev@example.com" }"#,
    |account| {
        assert_eq!(account.api_key_name, "ci-key");
        assert_eq!(account.user_email.as_deref(), Some("dev@example.com"));
    }
);

parse_and_validate!(
    agent_list_payload,
    AgentList,
    r#"{
        "agents": [
            {
                "id": "bc_1",
                "name": "Fix flaky test",
                "status": "RUNNING",
                "source": { "repository": "https://github.com/acme/widgets", "ref": "main" },
                "createdAt": "2024-01-15T10:30:00Z"
            },
            {
                "id": "bc_2",
                "name": "Bump deps",
                "status": "EXPIRED",
                "source": { "repository": "https://github.com/acme/widgets" },
                "target": { "branchName": "agent/bump", "autoCreatePr": false },
                "summary": "Bumped three crates.",
                "createdAt": "2024-01-14T08:00:00Z"
            }
        ],
        "nextCursor": "bc_2"
    }"#,
    |list| {
        assert_eq!(list.agents.len(), 2);
        assert_eq!(list.agents[1].status, AgentStatus::Expired);
        assert_eq!(list.next_cursor.as_deref(), Some("bc_2"));
    }
);

parse_and_validate!(
    conversation_payload,
    Conversation,
    r#"{
        "id": "bc_1",
        "messages": [
            { "id": "msg_1", "type": "user_message", "text": "Fix the flaky test" },
            { "id": "msg_2", "type": "assistant_message", "text": "Looking at it now." }
        ]
    }"#,
    |conversation| {
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].kind, MessageKind::UserMessage);
        assert_eq!(conversation.messages[1].id, "msg_2");
    }
);

parse_and_validate!(
    repository_list_payload,
    RepositoryList,
    r#"{ "repositories": [ { "owner": "acme", "name": "widgets", "repository": "https://github.com/acme/widgets" } ] }"#,
    |list| {
        assert_eq!(list.repositories[0].owner, "acme");
    }
);

parse_and_validate!(
    agent_id_payload,
    AgentIdResponse,
    r#"{ "id": "bc_1" }"#,
    |response| {
        assert_eq!(response.id, "bc_1");
    }
);

#[test]
fn conversation_with_unknown_message_type_is_rejected() {
    let parsed: Result<Conversation, _> = serde_json::from_str(
        r#"{ "id": "bc_1", "messages": [ { "id": "m", "type": "tool_call", "text": "" } ] }"#,
    );
    assert!(parsed.is_err());
}

#[test]
fn agent_schema_requires_status() {
    let schema = serde_json::to_value(schema_for!(Agent)).unwrap();
    let instance = serde_json::json!({
        "id": "bc_1",
        "name": "x",
        "source": { "repository": "r" },
        "createdAt": "2024-01-15T10:30:00Z"
    });
    assert!(!validate_against_schema(&schema, &instance).is_empty());
}
