//! Round-trip coverage for the packed string channel over a real mesh.

use foreman::{
    communication::{Comm, MsgTag, PackedStringChannel},
    Logger,
};

mod utils;

#[tokio::test(flavor = "multi_thread")]
async fn packed_lines_round_trip() {
    let addresses = utils::local_addresses(9410, 3);
    let (a, b, c) = tokio::join!(
        Comm::connect("packed-test", 0, addresses.clone()),
        Comm::connect("packed-test", 1, addresses.clone()),
        Comm::connect("packed-test", 2, addresses.clone()),
    );
    let comm0 = a.expect("rank 0 could not connect");
    let comm1 = b.expect("rank 1 could not connect");
    let comm2 = c.expect("rank 2 could not connect");

    let lines = vec![
        "line 1".to_string(),
        "line 2".to_string(),
        "last line".to_string(),
    ];

    // One packed send per destination; the buffers stay owned by the channel
    // until wait_all releases them.
    let mut sender =
        PackedStringChannel::new(comm0.clone(), Logger::new(comm0.clone(), 1));
    sender
        .isend(1, MsgTag::Data, &lines)
        .expect("could not post the send to rank 1");
    sender
        .isend(2, MsgTag::Data, &lines)
        .expect("could not post the send to rank 2");
    assert_eq!(sender.pending_sends(), 2);
    sender.wait_all().await;
    assert_eq!(sender.pending_sends(), 0);

    let receiver1 =
        PackedStringChannel::new(comm1.clone(), Logger::new(comm1.clone(), 1));
    let received1 = receiver1
        .receive(0, MsgTag::Data)
        .await
        .expect("rank 1 receive failed");
    assert_eq!(received1, lines);

    let receiver2 =
        PackedStringChannel::new(comm2.clone(), Logger::new(comm2.clone(), 1));
    let received2 = receiver2
        .receive(0, MsgTag::Data)
        .await
        .expect("rank 2 receive failed");
    assert_eq!(received2, lines);

    // wait_all completed without shipping any error log lines.
    assert!(comm1
        .try_probe(Some(0), Some(MsgTag::ErrorMessage))
        .is_none());

    for comm in [comm0, comm1, comm2] {
        comm.finalize().await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_vector_arrives_empty() {
    let addresses = utils::local_addresses(9415, 3);
    let (a, b, c) = tokio::join!(
        Comm::connect("packed-test", 0, addresses.clone()),
        Comm::connect("packed-test", 1, addresses.clone()),
        Comm::connect("packed-test", 2, addresses.clone()),
    );
    let comm0 = a.expect("rank 0 could not connect");
    let comm1 = b.expect("rank 1 could not connect");
    let comm2 = c.expect("rank 2 could not connect");

    let mut sender =
        PackedStringChannel::new(comm0.clone(), Logger::new(comm0.clone(), 1));
    sender
        .isend(2, MsgTag::Data, &[])
        .expect("could not post the empty send");
    sender.wait_all().await;

    let receiver2 =
        PackedStringChannel::new(comm2.clone(), Logger::new(comm2.clone(), 1));
    let received = receiver2
        .receive(0, MsgTag::Data)
        .await
        .expect("rank 2 receive failed");
    assert!(received.is_empty());

    for comm in [comm0, comm1, comm2] {
        comm.finalize().await;
    }
}
