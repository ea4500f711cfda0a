use super::*;
use crate::state::test_helpers::*;
use tokio::sync::mpsc;

fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

#[tokio::test]
async fn apply_pixel_mutates_and_reaches_every_client() {
    let state = test_app_state();
    let (_a, mut rx_a) = register_client(&state);
    let (_b, mut rx_b) = register_client(&state);

    let placement = state.grid.validate(2, 1, "orange").unwrap();
    let pixel = apply_pixel(&state, placement).await;

    assert_eq!(pixel, Pixel { x: 2, y: 1, color: "orange".into() });
    assert_eq!(state.grid.get(2, 1).await, Some("orange"));
    for rx in [&mut rx_a, &mut rx_b] {
        assert_eq!(recv_message(rx).await, ServerMessage::from(pixel.clone()));
    }
}

#[tokio::test]
async fn concurrent_updates_arrive_in_one_global_order() {
    let state = test_app_state();
    let (_a, mut rx_a) = register_client(&state);
    let (_b, mut rx_b) = register_client(&state);

    let colors = ["red", "green", "blue", "white", "yellow", "orange", "purple", "tan"];
    let tasks: Vec<_> = colors
        .iter()
        .map(|color| {
            let state = state.clone();
            let placement = state.grid.validate(0, 0, color).unwrap();
            tokio::spawn(async move { apply_pixel(&state, placement).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let mut seen_a = Vec::new();
    let mut seen_b = Vec::new();
    for _ in 0..colors.len() {
        seen_a.push(recv_message(&mut rx_a).await);
        seen_b.push(recv_message(&mut rx_b).await);
    }
    assert_eq!(seen_a, seen_b);

    // The last broadcast matches the final grid value.
    let ServerMessage::Pixel(last) = seen_a.last().unwrap() else {
        panic!("expected pixel");
    };
    assert_eq!(state.grid.get(0, 0).await, Some(last.color.as_str()));
}

#[tokio::test]
async fn closed_client_does_not_block_others() {
    let state = test_app_state();
    let (_a, mut rx_a) = register_client(&state);
    let (closed_id, rx_closed) = register_client(&state);
    let (_c, mut rx_c) = register_client(&state);
    drop(rx_closed);

    let pixel = Pixel { x: 0, y: 0, color: "red".into() };
    let delivered = broadcast_pixel(&state.registry, &pixel);

    assert_eq!(delivered, 2);
    assert_eq!(recv_message(&mut rx_a).await, ServerMessage::from(pixel.clone()));
    assert_eq!(recv_message(&mut rx_c).await, ServerMessage::from(pixel));
    assert!(state.registry.contains(closed_id), "delivery failure never unregisters");
}

#[tokio::test]
async fn full_queue_evicts_only_that_client() {
    let state = test_app_state();
    let (a, mut rx_a) = register_client(&state);
    let slow_id = uuid::Uuid::new_v4();
    let (slow_tx, mut slow_rx) = mpsc::channel(1);
    state.registry.register(slow_id, slow_tx);

    let first = Pixel { x: 0, y: 0, color: "red".into() };
    let second = Pixel { x: 1, y: 0, color: "blue".into() };
    let third = Pixel { x: 2, y: 0, color: "green".into() };
    assert_eq!(broadcast_pixel(&state.registry, &first), 2);
    assert_eq!(broadcast_pixel(&state.registry, &second), 1);

    assert!(!state.registry.contains(slow_id), "lagging client is evicted");
    assert!(state.registry.contains(a));
    assert_eq!(broadcast_pixel(&state.registry, &third), 1);

    for pixel in [first.clone(), second, third] {
        assert_eq!(recv_message(&mut rx_a).await, ServerMessage::from(pixel));
    }
    // The queued message drains, then the queue reports closed.
    assert_eq!(recv_message(&mut slow_rx).await, ServerMessage::from(first));
    assert!(slow_rx.recv().await.is_none());
}

#[tokio::test]
async fn client_count_reports_current_size() {
    let state = test_app_state();
    let (_a, mut rx_a) = register_client(&state);
    let (b, mut rx_b) = register_client(&state);

    assert_eq!(broadcast_client_count(&state.registry), 2);
    assert_eq!(recv_message(&mut rx_a).await, ServerMessage::count(2));
    assert_eq!(recv_message(&mut rx_b).await, ServerMessage::count(2));

    state.registry.unregister(b);
    assert_eq!(broadcast_client_count(&state.registry), 1);
    assert_eq!(recv_message(&mut rx_a).await, ServerMessage::count(1));
    assert_no_outbound(&mut rx_b).await;
}

#[tokio::test]
async fn import_resyncs_full_grid_to_every_client() {
    let state = test_app_state();
    let before = state.grid.validate(3, 2, "green").unwrap();
    state.grid.set(before).await;
    let (_a, mut rx_a) = register_client(&state);
    let (_b, mut rx_b) = register_client(&state);

    let (summary, delivered) = import_and_resync(&state, &entries(&[("1,1", "red"), ("9,9", "red")])).await;

    assert_eq!(summary, ReplaceSummary { applied: 1, skipped: 1 });
    assert_eq!(delivered, 2);
    let cells = usize::from(TEST_GRID_WIDTH) * usize::from(TEST_GRID_HEIGHT);
    for rx in [&mut rx_a, &mut rx_b] {
        let Outbound::Batch(batch) = recv_outbound(rx).await else {
            panic!("expected full-grid batch");
        };
        assert_eq!(batch.len(), cells);
        let red: Vec<_> = batch
            .iter()
            .filter(|m| matches!(m, ServerMessage::Pixel(p) if p.color == "red"))
            .collect();
        assert_eq!(red, vec![&ServerMessage::from(Pixel { x: 1, y: 1, color: "red".into() })]);
        assert!(
            batch
                .iter()
                .all(|m| matches!(m, ServerMessage::Pixel(p) if p.color != "green")),
            "cells absent from the import are reset"
        );
    }
    assert_eq!(state.grid.get(3, 2).await, Some("black"));
}
