//! Symbolic event codes, grouped by owning entity
//!
//! Every cross-thread signal in the system is identified by a compact
//! `(group, code, instance)` triple instead of a formatted kernel-object name.
//! Each group enum is repr-contiguous so a signal block can hold its events in
//! a fixed array indexed by `code.index()`.

use std::fmt;

/// Owning entity kind for an event block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventGroup {
    /// Per-camera acquisition thread events
    Camera,
    /// Per-projector drawing/presentation events (plus camera-adjacent shared barriers)
    Draw,
    /// Per-encoder drain thread events
    Encoder,
    /// Per-decoder drain thread events
    Decoder,
    /// Single process-wide group
    Main,
}

impl EventGroup {
    /// Number of symbolic codes owned by this group
    pub const fn code_count(self) -> usize {
        match self {
            EventGroup::Camera => CameraCode::COUNT,
            EventGroup::Draw => DrawCode::COUNT,
            EventGroup::Encoder => EncoderCode::COUNT,
            EventGroup::Decoder => DecoderCode::COUNT,
            EventGroup::Main => MainCode::COUNT,
        }
    }

    /// Human-readable group name for diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            EventGroup::Camera => "camera",
            EventGroup::Draw => "draw",
            EventGroup::Encoder => "encoder",
            EventGroup::Decoder => "decoder",
            EventGroup::Main => "main",
        }
    }
}

impl fmt::Display for EventGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Events owned by one camera acquisition thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum CameraCode {
    /// Stop the acquisition thread
    Terminate = 0,
    /// Enter the idle-prepared state before a batch
    Prepare,
    /// Fire the exposure for the current frame
    SendTrigger,
    /// Retry triggering after a transient failure
    RepeatTrigger,
    /// Exposure window has opened (informational, consumed by encoders/UI)
    ExposureBegin,
    /// Exposure window elapsed
    ExposureEnd,
    /// Frame fully transferred from the device
    TransferEnd,
    /// Re-home this thread to new projector/camera/encoder indices
    ChangeId,
    /// Camera is ready for the next trigger
    Ready,
    /// Batch preparation acknowledged back to the main thread
    PrepareDone,
    /// This camera confirmed its last frame of the batch completed
    LastFrameDone,
}

impl CameraCode {
    /// Number of camera codes
    pub const COUNT: usize = 11;

    /// All camera codes in index order
    pub const ALL: [CameraCode; Self::COUNT] = [
        CameraCode::Terminate,
        CameraCode::Prepare,
        CameraCode::SendTrigger,
        CameraCode::RepeatTrigger,
        CameraCode::ExposureBegin,
        CameraCode::ExposureEnd,
        CameraCode::TransferEnd,
        CameraCode::ChangeId,
        CameraCode::Ready,
        CameraCode::PrepareDone,
        CameraCode::LastFrameDone,
    ];

    /// Position of this code inside its signal block
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Events owned by one projector/drawing thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum DrawCode {
    /// Stop the drawing thread
    Terminate = 0,
    /// Present the next pattern (conditional: all attached cameras must request it)
    Present,
    /// The next pattern is staged and ready to present
    PresentReady,
    /// Render the next pattern (conditional in non-concurrent mode)
    Render,
    /// The renderer is ready for the next render request
    RenderReady,
    /// Vertical blank occurred / frame presented
    VBlank,
    /// All attached cameras finished their trigger phase (conditional barrier)
    SyncTriggers,
    /// Re-home the drawing thread to a new projector index
    ChangeId,
}

impl DrawCode {
    /// Number of draw codes
    pub const COUNT: usize = 8;

    /// All draw codes in index order
    pub const ALL: [DrawCode; Self::COUNT] = [
        DrawCode::Terminate,
        DrawCode::Present,
        DrawCode::PresentReady,
        DrawCode::Render,
        DrawCode::RenderReady,
        DrawCode::VBlank,
        DrawCode::SyncTriggers,
        DrawCode::ChangeId,
    ];

    /// Position of this code inside its signal block
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Events owned by one image-encoder drain thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum EncoderCode {
    /// Stop the encoder thread
    Terminate = 0,
    /// A frame is queued for encoding
    Encode,
    /// Re-home the encoder to a new camera index
    ChangeId,
    /// Encoder drained its queue
    Ready,
}

impl EncoderCode {
    /// Number of encoder codes
    pub const COUNT: usize = 4;

    /// All encoder codes in index order
    pub const ALL: [EncoderCode; Self::COUNT] = [
        EncoderCode::Terminate,
        EncoderCode::Encode,
        EncoderCode::ChangeId,
        EncoderCode::Ready,
    ];

    /// Position of this code inside its signal block
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Events owned by one image-decoder drain thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum DecoderCode {
    /// Stop the decoder thread
    Terminate = 0,
    /// A frame is queued for decoding
    Decode,
    /// Decoder drained its queue
    Ready,
}

impl DecoderCode {
    /// Number of decoder codes
    pub const COUNT: usize = 3;

    /// All decoder codes in index order
    pub const ALL: [DecoderCode; Self::COUNT] = [
        DecoderCode::Terminate,
        DecoderCode::Decode,
        DecoderCode::Ready,
    ];

    /// Position of this code inside its signal block
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Events owned by the single main group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum MainCode {
    /// Tear the whole pipeline down
    Terminate = 0,
    /// Abort the current batch (drawing thread bail-out)
    AbortBatch,
}

impl MainCode {
    /// Number of main codes
    pub const COUNT: usize = 2;

    /// All main codes in index order
    pub const ALL: [MainCode; Self::COUNT] = [MainCode::Terminate, MainCode::AbortBatch];

    /// Position of this code inside its signal block
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Unified event code across all groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCode {
    Camera(CameraCode),
    Draw(DrawCode),
    Encoder(EncoderCode),
    Decoder(DecoderCode),
    Main(MainCode),
}

impl EventCode {
    /// The group this code belongs to
    pub const fn group(self) -> EventGroup {
        match self {
            EventCode::Camera(_) => EventGroup::Camera,
            EventCode::Draw(_) => EventGroup::Draw,
            EventCode::Encoder(_) => EventGroup::Encoder,
            EventCode::Decoder(_) => EventGroup::Decoder,
            EventCode::Main(_) => EventGroup::Main,
        }
    }

    /// Position of this code inside its group's signal block
    pub const fn index(self) -> usize {
        match self {
            EventCode::Camera(c) => c.index(),
            EventCode::Draw(c) => c.index(),
            EventCode::Encoder(c) => c.index(),
            EventCode::Decoder(c) => c.index(),
            EventCode::Main(c) => c.index(),
        }
    }
}

impl From<CameraCode> for EventCode {
    fn from(code: CameraCode) -> Self {
        EventCode::Camera(code)
    }
}

impl From<DrawCode> for EventCode {
    fn from(code: DrawCode) -> Self {
        EventCode::Draw(code)
    }
}

impl From<EncoderCode> for EventCode {
    fn from(code: EncoderCode) -> Self {
        EventCode::Encoder(code)
    }
}

impl From<DecoderCode> for EventCode {
    fn from(code: DecoderCode) -> Self {
        EventCode::Decoder(code)
    }
}

impl From<MainCode> for EventCode {
    fn from(code: MainCode) -> Self {
        EventCode::Main(code)
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventCode::Camera(c) => write!(f, "camera::{:?}", c),
            EventCode::Draw(c) => write!(f, "draw::{:?}", c),
            EventCode::Encoder(c) => write!(f, "encoder::{:?}", c),
            EventCode::Decoder(c) => write!(f, "decoder::{:?}", c),
            EventCode::Main(c) => write!(f, "main::{:?}", c),
        }
    }
}
