//! Transport-level coverage: probe filtering, send completion reporting, and
//! the command-line-args service.

use bytes::Bytes;
use foreman::{
    communication::{Comm, MsgTag},
    fetch_cmdline_args,
};

mod utils;

#[tokio::test(flavor = "multi_thread")]
async fn probe_filters_by_source_and_tag() {
    let addresses = utils::local_addresses(9420, 3);
    let (a, b, c) = tokio::join!(
        Comm::connect("comm-test", 0, addresses.clone()),
        Comm::connect("comm-test", 1, addresses.clone()),
        Comm::connect("comm-test", 2, addresses.clone()),
    );
    let comm0 = a.expect("rank 0 could not connect");
    let comm1 = b.expect("rank 1 could not connect");
    let comm2 = c.expect("rank 2 could not connect");

    comm0
        .send(1, MsgTag::Data, Bytes::from_static(b"payload"))
        .await
        .expect("send failed");
    comm0
        .send(1, MsgTag::LogMessage, Bytes::from_static(b"a line"))
        .await
        .expect("send failed");
    comm2
        .send(1, MsgTag::Data, Bytes::from_static(b"other"))
        .await
        .expect("send failed");

    // A tag filter skips past earlier non-matching messages.
    let status = comm1.probe(Some(0), Some(MsgTag::LogMessage)).await;
    assert_eq!(status.source, 0);
    assert_eq!(status.msg_tag(), MsgTag::LogMessage);
    assert_eq!(status.count, 6);
    let (_, payload) = comm1.recv(Some(0), Some(MsgTag::LogMessage)).await;
    assert_eq!(&payload[..], b"a line");

    // The skipped message is still there, in order.
    let (status, payload) = comm1.recv(Some(0), Some(MsgTag::Data)).await;
    assert_eq!(status.source, 0);
    assert_eq!(&payload[..], b"payload");

    // A source filter finds the other sender's message.
    let (status, payload) = comm1.recv(Some(2), None).await;
    assert_eq!(status.source, 2);
    assert_eq!(&payload[..], b"other");

    assert!(comm1.try_probe(None, None).is_none());

    for comm in [comm0, comm1, comm2] {
        comm.finalize().await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn posted_sends_complete_and_report() {
    let addresses = utils::local_addresses(9425, 3);
    let (a, b, c) = tokio::join!(
        Comm::connect("comm-test", 0, addresses.clone()),
        Comm::connect("comm-test", 1, addresses.clone()),
        Comm::connect("comm-test", 2, addresses.clone()),
    );
    let comm0 = a.expect("rank 0 could not connect");
    let comm1 = b.expect("rank 1 could not connect");
    let comm2 = c.expect("rank 2 could not connect");

    let mut requests = Vec::new();
    for destination in [1, 2] {
        requests.push(
            comm0
                .isend(destination, MsgTag::Data, Bytes::from_static(b"fan-out"))
                .expect("could not post the send"),
        );
    }
    let statuses = comm0.wait_all(requests).await;
    assert_eq!(statuses.len(), 2);
    for status in &statuses {
        assert!(status.is_ok(), "send to {} failed", status.rank);
        assert_eq!(status.tag, MsgTag::Data.raw());
    }

    let (_, payload) = comm1.recv(Some(0), Some(MsgTag::Data)).await;
    assert_eq!(&payload[..], b"fan-out");
    let (_, payload) = comm2.recv(Some(0), Some(MsgTag::Data)).await;
    assert_eq!(&payload[..], b"fan-out");

    for comm in [comm0, comm1, comm2] {
        comm.finalize().await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cmdline_args_service_round_trips() {
    let addresses = utils::local_addresses(9430, 3);
    let (a, b, c) = tokio::join!(
        Comm::connect("comm-test", 0, addresses.clone()),
        Comm::connect("comm-test", 1, addresses.clone()),
        Comm::connect("comm-test", 2, addresses.clone()),
    );
    let comm0 = a.expect("rank 0 could not connect");
    let comm1 = b.expect("rank 1 could not connect");
    let comm2 = c.expect("rank 2 could not connect");

    // Rank 0 plays the controller's side of the service.
    let server = tokio::spawn({
        let comm0 = comm0.clone();
        async move {
            let (status, _) = comm0
                .recv(None, Some(MsgTag::RequestCmdLineArgs))
                .await;
            comm0
                .send(
                    status.source,
                    MsgTag::CmdLineArgs,
                    Bytes::from_static(b"alpha\nbeta\ngamma"),
                )
                .await
                .expect("could not serve the args");
        }
    });

    let args = fetch_cmdline_args(&comm2).await.expect("fetch failed");
    assert_eq!(
        args,
        vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()]
    );
    server.await.expect("the server task panicked");

    for comm in [comm0, comm1, comm2] {
        comm.finalize().await;
    }
}
