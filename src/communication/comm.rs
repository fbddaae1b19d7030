use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use bytes::Bytes;
use futures::{future, stream::SplitSink, stream::SplitStream, SinkExt, StreamExt};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        oneshot, Notify,
    },
    task::JoinHandle,
};
use tokio_util::codec::Framed;

use crate::{
    communication::{CommunicationError, Envelope, EnvelopeCodec, MsgTag, Status},
    Rank,
};

/// A message queued for a peer, paired with a completion channel so that
/// [`Comm::wait_all`] can observe the outcome of the posted send.
struct Outbound {
    tag: i32,
    payload: Bytes,
    completion: oneshot::Sender<Option<CommunicationError>>,
}

/// A handle for an asynchronously posted send.
///
/// The request completes once the sender task has written the message to the
/// peer's stream (or failed to). Dropping the request detaches from the
/// outcome without cancelling the send.
pub struct SendRequest {
    destination: Rank,
    tag: i32,
    completion: oneshot::Receiver<Option<CommunicationError>>,
}

impl SendRequest {
    pub fn destination(&self) -> Rank {
        self.destination
    }

    pub fn tag(&self) -> i32 {
        self.tag
    }
}

/// The outcome of one posted send, as reported by [`Comm::wait_all`].
#[derive(Debug)]
pub struct SendStatus {
    /// The peer rank the send was addressed to.
    pub rank: Rank,
    /// The message tag of the send.
    pub tag: i32,
    /// The error, if the send did not complete successfully.
    pub error: Option<CommunicationError>,
}

impl SendStatus {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// In-order store of messages received from all peers, supporting MPI-style
/// probe (peek without consuming) and receive (consume) with source and tag
/// filters.
struct Mailbox {
    queue: Mutex<VecDeque<Envelope>>,
    arrived: Notify,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
        }
    }

    fn push(&self, envelope: Envelope) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(envelope);
        }
        self.arrived.notify_waiters();
    }

    fn matches(envelope: &Envelope, src: Option<Rank>, tag: Option<i32>) -> bool {
        src.map_or(true, |s| envelope.src == s) && tag.map_or(true, |t| envelope.tag == t)
    }

    fn peek(&self, src: Option<Rank>, tag: Option<i32>) -> Option<Status> {
        let queue = self.queue.lock().ok()?;
        queue
            .iter()
            .find(|envelope| Self::matches(envelope, src, tag))
            .map(Status::of)
    }

    fn take(&self, src: Option<Rank>, tag: Option<i32>) -> Option<Envelope> {
        let mut queue = self.queue.lock().ok()?;
        let position = queue
            .iter()
            .position(|envelope| Self::matches(envelope, src, tag))?;
        queue.remove(position)
    }

    async fn wait_peek(&self, src: Option<Rank>, tag: Option<i32>) -> Status {
        loop {
            let notified = self.arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(status) = self.peek(src, tag) {
                return status;
            }
            notified.await;
        }
    }

    async fn wait_take(&self, src: Option<Rank>, tag: Option<i32>) -> Envelope {
        loop {
            let notified = self.arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(envelope) = self.take(src, tag) {
                return envelope;
            }
            notified.await;
        }
    }
}

/// The process-wide communicator: one ordered channel to every other rank of
/// the job, plus the mailbox holding everything received so far.
///
/// A `Comm` is created by [`Comm::connect`], which blocks until the full mesh
/// is established, and must be shut down with [`Comm::finalize`], which
/// flushes all posted sends. Use outside those brackets fails with
/// [`CommunicationError::Disconnected`].
pub struct Comm {
    rank: Rank,
    size: usize,
    name: String,
    local_address: SocketAddr,
    outboxes: Mutex<HashMap<Rank, UnboundedSender<Outbound>>>,
    mailbox: Arc<Mailbox>,
    sender_tasks: Mutex<Vec<JoinHandle<()>>>,
    receiver_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Comm {
    /// Establishes the full mesh between this rank and every other rank.
    ///
    /// The address vector is indexed by rank. This rank connects to every
    /// lower rank (retrying until the peer is listening) and accepts a
    /// connection from every higher rank; each side announces its rank as a
    /// `u32` handshake, following which the stream carries framed envelopes.
    pub async fn connect(
        name: &str,
        rank: Rank,
        addresses: Vec<SocketAddr>,
    ) -> Result<Arc<Comm>, CommunicationError> {
        let size = addresses.len();
        if rank < 0 || rank as usize >= size {
            return Err(CommunicationError::UnknownRank(rank));
        }
        let local_address = addresses[rank as usize];
        let listener = TcpListener::bind(local_address).await?;

        let connect_fut = connect_to_lower_ranks(&addresses[..rank as usize], rank);
        let accept_fut = accept_higher_ranks(listener, size - rank as usize - 1);
        let (mut streams, accepted) = future::try_join(connect_fut, accept_fut).await?;
        streams.extend(accepted);

        let comm = Arc::new(Comm {
            rank,
            size,
            name: name.to_string(),
            local_address,
            outboxes: Mutex::new(HashMap::new()),
            mailbox: Arc::new(Mailbox::new()),
            sender_tasks: Mutex::new(Vec::new()),
            receiver_tasks: Mutex::new(Vec::new()),
        });

        for (peer, stream) in streams {
            let framed = Framed::new(stream, EnvelopeCodec::new());
            let (sink, source) = framed.split();
            let (tx, rx) = mpsc::unbounded_channel();
            if let Ok(mut outboxes) = comm.outboxes.lock() {
                outboxes.insert(peer, tx);
            }
            let sender = tokio::spawn(run_sender(rank, peer, sink, rx));
            let receiver = tokio::spawn(run_receiver(rank, peer, source, comm.mailbox.clone()));
            if let Ok(mut tasks) = comm.sender_tasks.lock() {
                tasks.push(sender);
            }
            if let Ok(mut tasks) = comm.receiver_tasks.lock() {
                tasks.push(receiver);
            }
        }
        tracing::debug!(
            "rank {}: communicator \"{}\" connected to {} peers",
            rank,
            name,
            size - 1
        );
        Ok(comm)
    }

    /// The rank of this process within the job.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// The total number of processes in the job.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The name given to this communicator.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A human-readable identifier of the processor this rank runs on.
    pub fn processor_name(&self) -> String {
        self.local_address.to_string()
    }

    /// Posts an asynchronous send and returns a request that completes when
    /// the message has been written out.
    pub fn isend(
        &self,
        destination: Rank,
        tag: MsgTag,
        payload: Bytes,
    ) -> Result<SendRequest, CommunicationError> {
        let (completion_tx, completion_rx) = oneshot::channel();
        let request = SendRequest {
            destination,
            tag: tag.raw(),
            completion: completion_rx,
        };
        if destination == self.rank {
            // A self-addressed message skips the wire.
            self.mailbox.push(Envelope {
                src: self.rank,
                tag: tag.raw(),
                payload,
            });
            let _ = completion_tx.send(None);
            return Ok(request);
        }
        let outbox = {
            let outboxes = self
                .outboxes
                .lock()
                .map_err(|_| CommunicationError::Disconnected)?;
            outboxes
                .get(&destination)
                .cloned()
                .ok_or(CommunicationError::UnknownRank(destination))?
        };
        outbox.send(Outbound {
            tag: tag.raw(),
            payload,
            completion: completion_tx,
        })?;
        Ok(request)
    }

    /// Sends a message and waits until it has been written to the peer.
    pub async fn send(
        &self,
        destination: Rank,
        tag: MsgTag,
        payload: Bytes,
    ) -> Result<(), CommunicationError> {
        let request = self.isend(destination, tag, payload)?;
        match request.completion.await {
            Ok(None) => Ok(()),
            Ok(Some(error)) => Err(error),
            Err(e) => Err(CommunicationError::from(e)),
        }
    }

    /// Waits for all given send requests to complete, returning one
    /// [`SendStatus`] per request in posting order.
    pub async fn wait_all(&self, requests: Vec<SendRequest>) -> Vec<SendStatus> {
        let mut statuses = Vec::with_capacity(requests.len());
        for request in requests {
            let error = match request.completion.await {
                Ok(outcome) => outcome,
                Err(e) => Some(CommunicationError::from(e)),
            };
            statuses.push(SendStatus {
                rank: request.destination,
                tag: request.tag,
                error,
            });
        }
        statuses
    }

    /// Blocks until a message matching the source and tag filters is
    /// available, without consuming it. `None` matches any source / any tag.
    pub async fn probe(&self, src: Option<Rank>, tag: Option<MsgTag>) -> Status {
        self.mailbox.wait_peek(src, tag.map(MsgTag::raw)).await
    }

    /// Non-blocking variant of [`probe`](Comm::probe).
    pub fn try_probe(&self, src: Option<Rank>, tag: Option<MsgTag>) -> Option<Status> {
        self.mailbox.peek(src, tag.map(MsgTag::raw))
    }

    /// Blocks until a matching message is available and consumes it.
    pub async fn recv(&self, src: Option<Rank>, tag: Option<MsgTag>) -> (Status, Bytes) {
        let envelope = self.mailbox.wait_take(src, tag.map(MsgTag::raw)).await;
        (Status::of(&envelope), envelope.payload)
    }

    /// Shuts the communicator down: closes every peer channel, waits for the
    /// sender tasks to flush all posted messages, and stops the receivers.
    ///
    /// Idempotent; messages still queued in the mailbox are discarded.
    pub async fn finalize(&self) {
        if let Ok(mut outboxes) = self.outboxes.lock() {
            outboxes.clear();
        }
        let senders = match self.sender_tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        for task in senders {
            let _ = task.await;
        }
        let receivers = match self.receiver_tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        for task in receivers {
            task.abort();
        }
        tracing::debug!("rank {}: communicator \"{}\" finalized", self.rank, self.name);
    }
}

/// Connects to all lower-ranked peers and announces this rank on each stream.
async fn connect_to_lower_ranks(
    addresses: &[SocketAddr],
    rank: Rank,
) -> Result<Vec<(Rank, TcpStream)>, std::io::Error> {
    let mut connect_futures = Vec::new();
    for address in addresses.iter() {
        connect_futures.push(connect_to_rank(*address, rank));
    }
    let streams = future::try_join_all(connect_futures).await?;
    Ok((0..streams.len() as Rank).zip(streams).collect())
}

/// Creates a TCP connection to an address and writes this rank on the stream.
///
/// Keeps retrying until the peer is listening.
async fn connect_to_rank(address: SocketAddr, rank: Rank) -> Result<TcpStream, std::io::Error> {
    let mut last_err_msg_time = Instant::now();
    loop {
        match TcpStream::connect(address).await {
            Ok(mut stream) => {
                stream.set_nodelay(true)?;
                stream.write_u32(rank as u32).await?;
                return Ok(stream);
            }
            Err(e) => {
                // Only print connection errors every 1s.
                let now = Instant::now();
                if now.duration_since(last_err_msg_time) >= Duration::from_secs(1) {
                    tracing::warn!(
                        "rank {}: could not connect to {}; error {}; retrying",
                        rank,
                        address,
                        e
                    );
                    last_err_msg_time = now;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Accepts connections from `expected` higher-ranked peers, reading the rank
/// each peer announces.
async fn accept_higher_ranks(
    listener: TcpListener,
    expected: usize,
) -> Result<Vec<(Rank, TcpStream)>, std::io::Error> {
    let mut streams = Vec::with_capacity(expected);
    for _ in 0..expected {
        let (mut stream, _) = listener.accept().await?;
        stream.set_nodelay(true)?;
        let peer = stream.read_u32().await? as Rank;
        streams.push((peer, stream));
    }
    Ok(streams)
}

/// Drains the outbox channel for one peer onto its framed stream, reporting
/// each send's outcome on its completion channel.
async fn run_sender(
    rank: Rank,
    peer: Rank,
    mut sink: SplitSink<Framed<TcpStream, EnvelopeCodec>, Envelope>,
    mut rx: UnboundedReceiver<Outbound>,
) {
    while let Some(outbound) = rx.recv().await {
        let envelope = Envelope {
            src: rank,
            tag: outbound.tag,
            payload: outbound.payload,
        };
        match sink.send(envelope).await {
            Ok(()) => {
                let _ = outbound.completion.send(None);
            }
            Err(e) => {
                tracing::warn!(
                    "rank {}: send of tag {} to rank {} failed: {}",
                    rank,
                    outbound.tag,
                    peer,
                    e
                );
                let _ = outbound
                    .completion
                    .send(Some(CommunicationError::from(e)));
            }
        }
    }
    let _ = sink.close().await;
}

/// Pumps envelopes from one peer's stream into the mailbox.
async fn run_receiver(
    rank: Rank,
    peer: Rank,
    mut source: SplitStream<Framed<TcpStream, EnvelopeCodec>>,
    mailbox: Arc<Mailbox>,
) {
    while let Some(result) = source.next().await {
        match result {
            Ok(envelope) => mailbox.push(envelope),
            Err(e) => {
                tracing::warn!("rank {}: receive from rank {} failed: {}", rank, peer, e);
                break;
            }
        }
    }
}
