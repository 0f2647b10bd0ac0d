mod common;

use abathur::domain::models::Stream;
use abathur::services::overlay_broker::OverlayBroker;

#[tokio::test]
async fn late_subscriber_replays_the_full_prefix_then_joins_live() {
    let broker = OverlayBroker::new();
    for i in 0..5u8 {
        broker.publish_chunk("t1", Stream::Stdout, vec![i]).await;
    }

    let mut sub = broker.subscribe("t1", Some(0)).await;
    assert_eq!(sub.backlog.len(), 5);
    assert_eq!(sub.backlog.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);

    broker.publish_chunk("t1", Stream::Stdout, vec![5]).await;
    let live_event = sub.live.recv().await.expect("live event");
    assert_eq!(live_event.seq, 5);
}

#[tokio::test]
async fn subscribing_from_a_mid_stream_offset_skips_earlier_events() {
    let broker = OverlayBroker::new();
    for i in 0..5u8 {
        broker.publish_chunk("t1", Stream::Stdout, vec![i]).await;
    }

    let sub = broker.subscribe("t1", Some(3)).await;
    assert_eq!(sub.backlog.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4]);
}

#[tokio::test]
async fn two_subscribers_see_the_same_sequence() {
    let broker = OverlayBroker::new();
    let mut a = broker.subscribe("t1", Some(0)).await;
    let mut b = broker.subscribe("t1", Some(0)).await;

    for i in 0..3u8 {
        broker.publish_chunk("t1", Stream::Stdout, vec![i]).await;
    }

    let mut seqs_a = vec![];
    let mut seqs_b = vec![];
    for _ in 0..3 {
        seqs_a.push(a.live.recv().await.unwrap().seq);
        seqs_b.push(b.live.recv().await.unwrap().seq);
    }
    assert_eq!(seqs_a, seqs_b);
}

#[tokio::test]
async fn closing_a_topic_is_observable() {
    let broker = OverlayBroker::new();
    broker.publish_chunk("t1", Stream::Stdout, vec![0]).await;
    assert!(!broker.is_closed("t1").await);
    broker.close("t1", None).await;
    assert!(broker.is_closed("t1").await);
}
