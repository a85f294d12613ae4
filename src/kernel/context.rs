use std::sync::{
    atomic::{AtomicU32, Ordering},
    RwLock,
};

use tokio::sync::mpsc;
use tracing::trace;

use super::protocol::{ErrorContent, MessageHeader, StreamContent};

/// What the host runtime lends a kernel: the request being answered, the
/// execution counter and the iopub side of the connection.
#[mockall::automock]
pub trait KernelContext: Send + Sync {
    fn parent_header(&self) -> Option<MessageHeader>;

    fn execution_count(&self) -> u32;

    fn stream(&self, content: StreamContent, parent: Option<MessageHeader>);

    fn publish_execute_error(&self, content: ErrorContent, parent: Option<MessageHeader>);
}

/// Everything a kernel emitted through a [`ChannelContext`].
#[derive(Debug, Clone, PartialEq)]
pub enum KernelOutput {
    Stream {
        content: StreamContent,
        parent: Option<MessageHeader>,
    },
    ExecuteError {
        content: ErrorContent,
        parent: Option<MessageHeader>,
    },
}

/// [`KernelContext`] forwarding output to an unbounded channel.
///
/// The host calls [`begin_request`](Self::begin_request) before dispatching
/// a message; execute requests bump the execution counter.
pub struct ChannelContext {
    parent: RwLock<Option<MessageHeader>>,
    execution_count: AtomicU32,
    sender: mpsc::UnboundedSender<KernelOutput>,
}

impl ChannelContext {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<KernelOutput>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let context = Self {
            parent: RwLock::new(None),
            execution_count: AtomicU32::new(0),
            sender,
        };
        (context, receiver)
    }

    pub fn begin_request(&self, header: MessageHeader) {
        if header.msg_type == "execute_request" {
            self.execution_count.fetch_add(1, Ordering::SeqCst);
        }
        match self.parent.write() {
            Ok(mut parent) => *parent = Some(header),
            Err(poisoned) => *poisoned.into_inner() = Some(header),
        }
    }

    fn send(&self, output: KernelOutput) {
        trace!("kernel output: {:?}", output);
        // receiver gone means the host stopped listening
        let _ = self.sender.send(output);
    }
}

impl KernelContext for ChannelContext {
    fn parent_header(&self) -> Option<MessageHeader> {
        match self.parent.read() {
            Ok(parent) => parent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn execution_count(&self) -> u32 {
        self.execution_count.load(Ordering::SeqCst)
    }

    fn stream(&self, content: StreamContent, parent: Option<MessageHeader>) {
        self.send(KernelOutput::Stream { content, parent });
    }

    fn publish_execute_error(&self, content: ErrorContent, parent: Option<MessageHeader>) {
        self.send(KernelOutput::ExecuteError { content, parent });
    }
}
