//! Recorded commands.
//!
//! A pass appends [`Command`]s to a [`CommandStream`] while it records. When
//! the pass finishes, the stream is frozen into an immutable
//! [`FrozenStream`] that can be replayed into a [`CommandSink`] any number of
//! times, or executed inline by render passes when the stream is a bundle.
//!
//! Push-constant payloads are staged in a side buffer owned by the stream;
//! [`Command::SetPushConstants`] only stores the byte range.

use std::ops::Range;
use std::sync::Arc;

use gpubridge_core::Handle;

use crate::backend::CommandSink;
use crate::pass::PassKind;
use crate::types::{Color, IndexFormat, ScissorRect, ShaderStages, Viewport};

/// One recorded call, tagged by kind.
#[derive(Debug, Clone)]
pub enum Command {
    SetPipeline(Handle),
    SetBindGroup {
        slot: u32,
        bind_group: Handle,
        dynamic_offsets: Vec<u32>,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: Handle,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: Handle,
        format: IndexFormat,
        offset: u64,
    },
    SetPushConstants {
        stages: ShaderStages,
        offset: u32,
        /// Range into the owning stream's push-constant data.
        data: Range<u32>,
    },
    SetBlendConstant(Color),
    SetStencilReference(u32),
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),

    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },

    DrawIndirect {
        buffer: Handle,
        offset: u64,
    },
    DrawIndexedIndirect {
        buffer: Handle,
        offset: u64,
    },
    DispatchIndirect {
        buffer: Handle,
        offset: u64,
    },
    MultiDrawIndirect {
        buffer: Handle,
        offset: u64,
        count: u32,
    },
    MultiDrawIndexedIndirect {
        buffer: Handle,
        offset: u64,
        count: u32,
    },
    MultiDrawIndirectCount {
        buffer: Handle,
        offset: u64,
        count_buffer: Handle,
        count_offset: u64,
        max_count: u32,
    },
    MultiDrawIndexedIndirectCount {
        buffer: Handle,
        offset: u64,
        count_buffer: Handle,
        count_offset: u64,
        max_count: u32,
    },

    PushDebugGroup(String),
    PopDebugGroup,
    InsertDebugMarker(String),
    WriteTimestamp {
        query_set: Handle,
        index: u32,
    },
    BeginPipelineStatisticsQuery {
        query_set: Handle,
        index: u32,
    },
    EndPipelineStatisticsQuery,

    /// Replays a finished bundle inline.
    ExecuteBundle {
        bundle: Handle,
        stream: Arc<FrozenStream>,
    },
}

impl Command {
    /// Whether this command produces GPU work on its own.
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::Draw { .. }
                | Self::DrawIndexed { .. }
                | Self::DrawIndirect { .. }
                | Self::DrawIndexedIndirect { .. }
                | Self::MultiDrawIndirect { .. }
                | Self::MultiDrawIndexedIndirect { .. }
                | Self::MultiDrawIndirectCount { .. }
                | Self::MultiDrawIndexedIndirectCount { .. }
        )
    }

    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch { .. } | Self::DispatchIndirect { .. })
    }
}

/// Append-only command list owned by a recording pass.
#[derive(Debug)]
pub struct CommandStream {
    kind: PassKind,
    label: Option<String>,
    commands: Vec<Command>,
    push_constant_data: Vec<u8>,
}

impl CommandStream {
    pub fn new(kind: PassKind, label: Option<String>) -> Self {
        Self {
            kind,
            label,
            commands: Vec::new(),
            push_constant_data: Vec::new(),
        }
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Copy push-constant bytes into the side buffer and return their range.
    pub fn stage_push_constants(&mut self, data: &[u8]) -> Range<u32> {
        let start = self.push_constant_data.len() as u32;
        self.push_constant_data.extend_from_slice(data);
        start..self.push_constant_data.len() as u32
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Seal the stream. Consuming `self` guarantees this happens once.
    pub fn freeze(self) -> Arc<FrozenStream> {
        Arc::new(FrozenStream {
            kind: self.kind,
            label: self.label,
            commands: self.commands.into_boxed_slice(),
            push_constant_data: self.push_constant_data.into_boxed_slice(),
        })
    }
}

/// An immutable, finished command stream.
#[derive(Debug)]
pub struct FrozenStream {
    kind: PassKind,
    label: Option<String>,
    commands: Box<[Command]>,
    push_constant_data: Box<[u8]>,
}

impl FrozenStream {
    pub fn kind(&self) -> PassKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Bytes of a [`Command::SetPushConstants`] recorded in this stream.
    pub fn push_constant_data(&self, range: &Range<u32>) -> &[u8] {
        self.push_constant_data
            .get(range.start as usize..range.end as usize)
            .unwrap_or(&[])
    }

    /// Feed every command to `sink` in recording order.
    ///
    /// Bundles are expanded in place: the sink sees the
    /// [`Command::ExecuteBundle`] marker followed by the bundle's commands.
    pub fn replay<S: CommandSink + ?Sized>(&self, sink: &mut S) {
        for command in self.commands.iter() {
            sink.execute(command, self);
            if let Command::ExecuteBundle { stream, .. } = command {
                stream.replay(sink);
            }
        }
    }

    /// Count of draw commands, including those inside executed bundles.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .map(|command| match command {
                Command::ExecuteBundle { stream, .. } => stream.draw_count(),
                other => usize::from(other.is_draw()),
            })
            .sum()
    }
}

static_assertions::assert_impl_all!(FrozenStream: Send, Sync);
static_assertions::assert_impl_all!(CommandStream: Send);
