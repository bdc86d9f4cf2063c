// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Miscellaneous helper functions that didn't fit elsewhere.

use byteorder::{BigEndian, ReadBytesExt};
use std::{fs::File, io::Cursor, path::Path};

use crate::misc::type_aliases::Float;

/// Read a 16 bit gray png image from a file.
///
/// Returns `(width, height, buffer)` with the buffer in row major order.
pub fn read_png_16bits<P: AsRef<Path>>(
    file_path: P,
) -> Result<(usize, usize, Vec<u16>), png::DecodingError> {
    let img_file = File::open(file_path)?;
    let mut decoder = png::Decoder::new(img_file);
    // Use the IDENTITY transformation because by default
    // it will use STRIP_16 which only keep 8 bits.
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder.read_info()?;
    let mut buffer = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buffer)?;
    buffer.truncate(info.buffer_size());

    // Transform buffer into 16 bits slice.
    let mut buffer_u16 = vec![0; (info.width * info.height) as usize];
    let mut buffer_cursor = Cursor::new(buffer);
    buffer_cursor.read_u16_into::<BigEndian>(&mut buffer_u16)?;

    Ok((info.width as usize, info.height as usize, buffer_u16))
}

/// Nearest pixel `(row, col)` of floating point image coordinates `(x, y)`,
/// or `None` if it falls outside of an image of shape `(nrows, ncols)`.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
pub fn nearest_pixel(x: Float, y: Float, (nrows, ncols): (usize, usize)) -> Option<(usize, usize)> {
    let (col, row) = (x.round(), y.round());
    if col >= 0.0 && row >= 0.0 && col < ncols as Float && row < nrows as Float {
        Some((row as usize, col as usize))
    } else {
        None
    }
}
