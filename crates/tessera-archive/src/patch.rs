//! Row copies for patch reconstruction and sheet cropping.

use bytes::Bytes;
use serde::Deserialize;
use tessera_core::{LoadError, LoadResult, Rect, TextureDesc};

/// One patch sub-rectangle: `length` bytes at `offset` in the patch stream,
/// written to `(x, y, w, h)` of the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct PatchRect {
    pub offset: usize,
    pub length: usize,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PatchRect {
    #[must_use]
    pub fn dest(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }
}

/// Copy `rows` rows of `width` pixels from `src_offset` (advancing by
/// `src_stride` per row) to `(dst_x, dst_y)` in the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyOp {
    pub src_offset: usize,
    pub src_stride: usize,
    pub dst_x: u32,
    pub dst_y: u32,
    pub width: u32,
    pub rows: u32,
}

/// Validate patch rects against a `width x height` destination and a stream
/// of `stream_len` bytes.
pub fn plan_patch(
    file: &str,
    width: u32,
    height: u32,
    bpp: usize,
    rects: &[PatchRect],
    stream_len: usize,
) -> LoadResult<Vec<CopyOp>> {
    if rects.is_empty() {
        return Err(LoadError::MissingPatchRect {
            file: file.to_string(),
        });
    }

    rects
        .iter()
        .enumerate()
        .map(|(index, rect)| {
            let out_of_range = || LoadError::PatchRectOutOfRange {
                file: file.to_string(),
                index,
            };
            if !rect.dest().fits_within(width, height) {
                return Err(out_of_range());
            }
            let row_bytes = (rect.w as usize).checked_mul(bpp).ok_or_else(out_of_range)?;
            let needed = row_bytes
                .checked_mul(rect.h as usize)
                .ok_or_else(out_of_range)?;
            let end = rect.offset.checked_add(rect.length).ok_or_else(out_of_range)?;
            if rect.length < needed || end > stream_len {
                return Err(out_of_range());
            }
            Ok(CopyOp {
                src_offset: rect.offset,
                src_stride: row_bytes,
                dst_x: rect.x,
                dst_y: rect.y,
                width: rect.w,
                rows: rect.h,
            })
        })
        .collect()
}

/// Copy op cutting `rect` out of a `sheet_width x sheet_height` sheet into a
/// buffer of exactly `rect.w x rect.h`.
pub fn plan_crop(
    file: &str,
    sheet_width: u32,
    sheet_height: u32,
    bpp: usize,
    rect: Rect,
) -> LoadResult<CopyOp> {
    if rect.is_empty() || !rect.fits_within(sheet_width, sheet_height) {
        return Err(LoadError::PatchRectOutOfRange {
            file: file.to_string(),
            index: 0,
        });
    }
    Ok(CopyOp {
        src_offset: (rect.y as usize * sheet_width as usize + rect.x as usize) * bpp,
        src_stride: sheet_width as usize * bpp,
        dst_x: 0,
        dst_y: 0,
        width: rect.w,
        rows: rect.h,
    })
}

/// Incremental executor for a list of [`CopyOp`]s.
///
/// Ops must come from [`plan_patch`] or [`plan_crop`] against the same
/// destination size and source length.
#[derive(Debug)]
pub struct RowCopier {
    dst: Vec<u8>,
    dst_stride: usize,
    bpp: usize,
    ops: Vec<CopyOp>,
    op: usize,
    row: u32,
}

impl RowCopier {
    #[must_use]
    pub fn new(dst: Vec<u8>, dst_width: u32, bpp: usize, ops: Vec<CopyOp>) -> Self {
        Self {
            dst,
            dst_stride: dst_width as usize * bpp,
            bpp,
            ops,
            op: 0,
            row: 0,
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.op >= self.ops.len()
    }

    /// Copy up to `budget` rows (at least one). Returns `true` once every op
    /// has completed.
    pub fn step(&mut self, src: &[u8], budget: usize) -> bool {
        let mut left = budget.max(1);
        while left > 0 {
            let Some(op) = self.ops.get(self.op).copied() else {
                break;
            };
            if self.row >= op.rows {
                self.op += 1;
                self.row = 0;
                continue;
            }
            let len = op.width as usize * self.bpp;
            let from = op.src_offset + self.row as usize * op.src_stride;
            let to = (op.dst_y + self.row) as usize * self.dst_stride + op.dst_x as usize * self.bpp;
            self.dst[to..to + len].copy_from_slice(&src[from..from + len]);
            self.row += 1;
            left -= 1;
        }
        while self.ops.get(self.op).is_some_and(|op| self.row >= op.rows) {
            self.op += 1;
            self.row = 0;
        }
        self.is_done()
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.dst)
    }
}

/// Copier that rebuilds `file` from its base buffer and patch stream.
///
/// `base` must hold exactly one `desc`-sized buffer.
pub fn patch_copier(
    file: &str,
    base_name: &str,
    base: &[u8],
    desc: &TextureDesc,
    rects: &[PatchRect],
    stream_len: usize,
) -> LoadResult<RowCopier> {
    let expected = desc
        .format
        .buffer_len(desc.width, desc.height)
        .ok_or_else(|| LoadError::EntrySizeMismatch {
            file: file.to_string(),
            expected: usize::MAX,
            found: base.len(),
        })?;
    if base.len() != expected {
        return Err(LoadError::BaseSizeMismatch {
            file: file.to_string(),
            base: base_name.to_string(),
            expected,
            found: base.len(),
        });
    }
    let bpp = desc.format.bytes_per_pixel();
    let ops = plan_patch(file, desc.width, desc.height, bpp, rects, stream_len)?;
    Ok(RowCopier::new(base.to_vec(), desc.width, bpp, ops))
}
