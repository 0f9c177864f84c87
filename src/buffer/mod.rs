mod frame;

pub use frame::{EncodedFrame, FrameBuffer};
