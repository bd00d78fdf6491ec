use std::time::Duration;

use pandaura_primitives::{ProjectId, Tag, TagScope};
use pandaura_tags::Extractor;
use pretty_assertions::assert_eq;
use tokio::time::{Instant, sleep, timeout};

use super::*;
use crate::testing::{Outbound, ScriptedConnector, ServerEnd, endpoint, test_config};
use crate::{ClientMessage, ConnectionState, ServerMessage, SyncChannel, SyncId};

const PROJECT: ProjectId = ProjectId(7);

async fn start() -> (TagSyncHandle, TagUpdates, ServerEnd, mpsc::UnboundedReceiver<ServerEnd>) {
	let (connector, mut servers) = ScriptedConnector::new([]);
	let (channel, events) = SyncChannel::connect(connector, endpoint(PROJECT.0), test_config()).await.unwrap();
	channel.subscribe(PROJECT).unwrap();

	let mut server = servers.recv().await.unwrap();
	assert_eq!(server.next_message().await, Some(ClientMessage::Subscribe { project_id: PROJECT }));

	let controller = TagSyncController::new(PROJECT, Extractor::new());
	let (handle, updates) = spawn_tag_sync(controller, channel, events);
	(handle, updates, server, servers)
}

fn st_code(message: Option<ClientMessage>) -> String {
	match message {
		Some(ClientMessage::SyncTags { st_code, .. }) => st_code,
		other => panic!("expected sync_tags, got {other:?}"),
	}
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_send_one_message_with_last_content() {
	let (handle, _updates, mut server, _servers) = start().await;

	let started = Instant::now();
	handle.edit("VAR\n    First : BOOL;\nEND_VAR\n").unwrap();
	sleep(Duration::from_millis(400)).await;
	handle.edit("VAR\n    Second : BOOL;\nEND_VAR\n").unwrap();

	assert_eq!(st_code(server.next_message().await), "VAR\n    Second : BOOL;\nEND_VAR\n");
	assert_eq!(started.elapsed(), Duration::from_millis(1900));
	assert!(timeout(Duration::from_secs(10), server.next_message()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn server_tag_list_reaches_the_editor() {
	let (handle, mut updates, server, _servers) = start().await;

	server.push(ServerMessage::TagsUpdated {
		project_id: PROJECT,
		tags: vec![Tag::new("Start_Button", "BOOL", TagScope::Input)],
		parsed_count: 1,
	});
	let applied = updates.recv().await.unwrap();
	assert_eq!(applied.parsed_count, 1);
	assert_eq!(applied.regenerated_code.as_deref(), Some("VAR_INPUT\n    Start_Button : BOOL;\nEND_VAR\n"));

	handle.refresh().unwrap();
	server.push(ServerMessage::TagsUpdated {
		project_id: PROJECT,
		tags: Vec::new(),
		parsed_count: 0,
	});
	let applied = updates.recv().await.unwrap();
	assert_eq!(applied.regenerated_code.as_deref(), Some(pandaura_tags::EMPTY_PROGRAM_TEMPLATE));
}

#[tokio::test(start_paused = true)]
async fn regenerated_code_is_not_echoed() {
	let (handle, mut updates, mut server, _servers) = start().await;

	server.push(ServerMessage::TagsUpdated {
		project_id: PROJECT,
		tags: vec![Tag::new("Start_Button", "BOOL", TagScope::Input)],
		parsed_count: 1,
	});
	let code = updates.recv().await.unwrap().regenerated_code.unwrap();

	handle.edit(code).unwrap();
	assert_eq!(handle.flush().await.unwrap(), Some(SyncDecision::Unchanged));
	assert!(timeout(Duration::from_secs(5), server.next_message()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn pending_count_is_visible() {
	let (handle, _updates, server, _servers) = start().await;
	let mut status = handle.watch_status();

	server.push(ServerMessage::SyncQueued { sync_id: SyncId::Number(1) });
	server.push(ServerMessage::SyncQueued { sync_id: SyncId::Number(2) });
	status.wait_for(|s| s.pending_syncs == 2).await.unwrap();

	server.push(ServerMessage::Error { error: "rejected".into() });
	status.wait_for(|s| s.pending_syncs == 1).await.unwrap();
	assert_eq!(handle.status().last_error.as_deref(), Some("rejected"));
}

#[tokio::test(start_paused = true)]
async fn dropped_connection_resyncs_unanswered_edit() {
	let (handle, _updates, mut server, mut servers) = start().await;

	handle.edit("VAR\n    Pump : BOOL;\nEND_VAR\n").unwrap();
	assert_eq!(handle.flush().await.unwrap(), Some(SyncDecision::Sent));
	assert!(server.next_message().await.is_some());
	drop(server);

	let mut status = handle.watch_status();
	status.wait_for(|s| s.offline).await.unwrap();

	let mut second = servers.recv().await.unwrap();
	assert_eq!(second.next_message().await, Some(ClientMessage::Subscribe { project_id: PROJECT }));
	assert_eq!(st_code(second.next_message().await), "VAR\n    Pump : BOOL;\nEND_VAR\n");
	status.wait_for(|s| s.connection == ConnectionState::Subscribed && !s.offline).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_drops_pending_edit_and_closes() {
	let (handle, _updates, mut server, _servers) = start().await;

	handle.edit("VAR\n    Late : BOOL;\nEND_VAR\n").unwrap();
	handle.shutdown().await;

	assert_eq!(server.next_raw().await, Some(Outbound::Close(crate::NORMAL_CLOSURE)));
}
