// THEORY:
// The `replay` module decodes raw DCS dumps, the byte streams a camera server
// emits when asked for sorted DCS data. A dump is a plain concatenation of
// frames; each frame is 4 planes (DCS0..DCS3) of `rows x cols` little-endian
// u16 samples in sensor row-major order.
//
// Decoded planes are handed out in acquisition orientation, `(cols, rows)`, the
// same orientation a live camera link produces. The phase unwrapper turns them
// back into sensor `(row, col)`.
//
// A frame is decoded all-or-nothing: trailing bytes that do not make up a whole
// frame are a `FrameError::Truncated`, never a partially filled frame.

use crate::core_modules::grid::{Grid, RawFrame};
use crate::error::{FrameError, TofError};
use std::io::{ErrorKind, Read};

pub const DCS_PER_FRAME: usize = 4;
const BYTES_PER_SAMPLE: usize = 2;

/// Size of one encoded frame for a sensor of `rows x cols`.
pub fn frame_size_bytes(rows: usize, cols: usize) -> usize {
    DCS_PER_FRAME * rows * cols * BYTES_PER_SAMPLE
}

/// Decodes exactly one frame from `bytes`.
pub fn decode_frame(bytes: &[u8], rows: usize, cols: usize) -> Result<RawFrame, FrameError> {
    let expected_bytes = frame_size_bytes(rows, cols);
    if bytes.len() != expected_bytes {
        return Err(FrameError::Truncated {
            expected_bytes,
            actual_bytes: bytes.len(),
        });
    }
    if expected_bytes == 0 {
        return RawFrame::new(std::array::from_fn(|_| Grid::new(cols, rows)));
    }
    let plane_bytes = expected_bytes / DCS_PER_FRAME;
    let planes = bytes
        .chunks_exact(plane_bytes)
        .map(|plane| {
            let samples: Vec<u16> = plane
                .chunks_exact(BYTES_PER_SAMPLE)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .collect();
            Grid::from_vec(rows, cols, samples).map(|g| g.transposed())
        })
        .collect::<Result<Vec<_>, _>>()?;
    let dcs: [Grid<u16>; DCS_PER_FRAME] = planes.try_into().map_err(|_| FrameError::Truncated {
        expected_bytes,
        actual_bytes: bytes.len(),
    })?;
    RawFrame::new(dcs)
}

/// Decodes a whole in-memory dump.
pub fn decode_stream(bytes: &[u8], rows: usize, cols: usize) -> Result<Vec<RawFrame>, FrameError> {
    let frame_bytes = frame_size_bytes(rows, cols);
    if frame_bytes == 0 {
        return Ok(Vec::new());
    }
    let remainder = bytes.len() % frame_bytes;
    if remainder != 0 {
        return Err(FrameError::Truncated {
            expected_bytes: frame_bytes,
            actual_bytes: remainder,
        });
    }
    bytes
        .chunks_exact(frame_bytes)
        .map(|chunk| decode_frame(chunk, rows, cols))
        .collect()
}

/// Inverse of `decode_frame` for a frame in acquisition orientation.
pub fn encode_frame(frame: &RawFrame) -> Vec<u8> {
    let (cols, rows) = frame.dims();
    let mut out = Vec::with_capacity(frame_size_bytes(rows, cols));
    for plane in frame.planes() {
        for &sample in plane.transposed().iter() {
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
    out
}

/// Streams frames out of a dump without loading it whole.
pub struct ReplayReader<R: Read> {
    reader: R,
    rows: usize,
    cols: usize,
    buf: Vec<u8>,
    frames_read: u64,
}

impl<R: Read> ReplayReader<R> {
    /// `rows x cols` is the sensor size in sensor order.
    pub fn new(reader: R, rows: usize, cols: usize) -> Self {
        Self {
            reader,
            rows,
            cols,
            buf: vec![0; frame_size_bytes(rows, cols)],
            frames_read: 0,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Next frame, `None` at a clean end of stream.
    pub fn read_frame(&mut self) -> Result<Option<RawFrame>, TofError> {
        let filled = self.fill()?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < self.buf.len() {
            return Err(FrameError::Truncated {
                expected_bytes: self.buf.len(),
                actual_bytes: filled,
            }
            .into());
        }
        let frame = decode_frame(&self.buf, self.rows, self.cols)?;
        self.frames_read += 1;
        Ok(Some(frame))
    }

    fn fill(&mut self) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}
