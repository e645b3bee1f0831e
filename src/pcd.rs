// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Minimal PCD (Point Cloud Data) reader and writer.
//!
//! Reads `DATA ascii` and `DATA binary` files whose `x`, `y` and `z` fields
//! are `F` with size 4 or 8. Other fields are skipped. Compressed bodies are
//! rejected. The writer emits binary `x y z` as `F4`.

use crate::lidar::{Error, Points};
use std::{fs, path::Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataFormat {
    Ascii,
    Binary,
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    size: usize,
    kind: u8,
    count: usize,
}

#[derive(Debug)]
struct Header {
    fields: Vec<Field>,
    points: usize,
    format: DataFormat,
    /// Byte offset of the first body byte.
    body: usize,
}

impl Header {
    fn stride(&self) -> Result<usize, Error> {
        self.fields
            .iter()
            .try_fold(0usize, |acc, f| {
                f.size.checked_mul(f.count).and_then(|n| acc.checked_add(n))
            })
            .ok_or_else(|| Error::InvalidPcd("point stride overflows".to_string()))
    }

    /// Byte offset and size of the `x`, `y` and `z` fields within a point.
    fn xyz_layout(&self) -> Result<[(usize, usize); 3], Error> {
        let mut layout = [None; 3];
        let mut offset = 0;
        for field in &self.fields {
            let axis = match field.name.as_str() {
                "x" => Some(0),
                "y" => Some(1),
                "z" => Some(2),
                _ => None,
            };
            if let Some(axis) = axis {
                if field.kind != b'F' || !(field.size == 4 || field.size == 8) || field.count != 1
                {
                    return Err(Error::UnsupportedFormat(format!(
                        "field {} must be a single F4 or F8, got {}{} x{}",
                        field.name, field.kind as char, field.size, field.count
                    )));
                }
                layout[axis] = Some((offset, field.size));
            }
            offset += field.size * field.count;
        }

        match layout {
            [Some(x), Some(y), Some(z)] => Ok([x, y, z]),
            _ => Err(Error::InvalidPcd("missing x, y or z field".to_string())),
        }
    }

    /// Token index of the `x`, `y` and `z` values on an ascii line.
    fn xyz_columns(&self) -> Result<[usize; 3], Error> {
        self.xyz_layout()?;
        let mut columns = [0; 3];
        let mut column: usize = 0;
        for field in &self.fields {
            match field.name.as_str() {
                "x" => columns[0] = column,
                "y" => columns[1] = column,
                "z" => columns[2] = column,
                _ => {}
            }
            column = column.saturating_add(field.count);
        }
        Ok(columns)
    }
}

fn parse_list<T: std::str::FromStr>(key: &str, values: &[&str]) -> Result<Vec<T>, Error> {
    values
        .iter()
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| Error::InvalidPcd(format!("bad {key} value {v:?}")))
        })
        .collect()
}

fn parse_header(data: &[u8]) -> Result<Header, Error> {
    let mut names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut kinds: Vec<u8> = Vec::new();
    let mut counts: Option<Vec<usize>> = None;
    let mut width: Option<usize> = None;
    let mut height: usize = 1;
    let mut points: Option<usize> = None;

    let mut pos = 0;
    while pos < data.len() {
        let end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(data.len(), |i| pos + i + 1);
        let line = std::str::from_utf8(&data[pos..end])
            .map_err(|_| Error::InvalidPcd(format!("non-text header line at byte {pos}")))?
            .trim();
        pos = end;

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let Some(key) = tokens.next() else {
            continue;
        };
        let values: Vec<&str> = tokens.collect();

        match key {
            "VERSION" | "VIEWPOINT" => {}
            "FIELDS" => names = values.iter().map(|s| s.to_string()).collect(),
            "SIZE" => sizes = parse_list("SIZE", &values)?,
            "TYPE" => {
                kinds = values
                    .iter()
                    .map(|v| match v.as_bytes() {
                        [k @ (b'F' | b'I' | b'U')] => Ok(*k),
                        _ => Err(Error::InvalidPcd(format!("bad TYPE value {v:?}"))),
                    })
                    .collect::<Result<_, _>>()?
            }
            "COUNT" => counts = Some(parse_list("COUNT", &values)?),
            "WIDTH" => width = parse_list("WIDTH", &values)?.first().copied(),
            "HEIGHT" => height = parse_list("HEIGHT", &values)?.first().copied().unwrap_or(1),
            "POINTS" => points = parse_list("POINTS", &values)?.first().copied(),
            "DATA" => {
                let format = match values.first().copied() {
                    Some("ascii") => DataFormat::Ascii,
                    Some("binary") => DataFormat::Binary,
                    Some(other) => {
                        return Err(Error::UnsupportedFormat(format!("DATA {other}")));
                    }
                    None => return Err(Error::InvalidPcd("DATA without encoding".to_string())),
                };

                let counts = counts.unwrap_or_else(|| vec![1; names.len()]);
                if names.is_empty()
                    || sizes.len() != names.len()
                    || kinds.len() != names.len()
                    || counts.len() != names.len()
                {
                    return Err(Error::InvalidPcd(format!(
                        "FIELDS/SIZE/TYPE/COUNT lengths differ: {}/{}/{}/{}",
                        names.len(),
                        sizes.len(),
                        kinds.len(),
                        counts.len()
                    )));
                }
                let points = match (points, width) {
                    (Some(p), _) => p,
                    (None, Some(w)) => w.checked_mul(height).ok_or_else(|| {
                        Error::InvalidPcd(format!("WIDTH {w} x HEIGHT {height} overflows"))
                    })?,
                    (None, None) => {
                        return Err(Error::InvalidPcd("missing POINTS and WIDTH".to_string()));
                    }
                };

                let fields = names
                    .into_iter()
                    .zip(sizes)
                    .zip(kinds)
                    .zip(counts)
                    .map(|(((name, size), kind), count)| Field {
                        name,
                        size,
                        kind,
                        count,
                    })
                    .collect();

                return Ok(Header {
                    fields,
                    points,
                    format,
                    body: pos,
                });
            }
            other => return Err(Error::InvalidPcd(format!("unknown header key {other:?}"))),
        }
    }

    Err(Error::InvalidPcd("header has no DATA line".to_string()))
}

#[inline]
fn read_float(bytes: &[u8], size: usize) -> f32 {
    if size == 8 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(b) as f32
    } else {
        let mut b = [0u8; 4];
        b.copy_from_slice(&bytes[..4]);
        f32::from_le_bytes(b)
    }
}

fn read_binary(header: &Header, data: &[u8]) -> Result<Points, Error> {
    let layout = header.xyz_layout()?;
    let stride = header.stride()?;
    let body = &data[header.body..];
    let needed = header.points.checked_mul(stride).ok_or_else(|| {
        Error::InvalidPcd(format!("POINTS {} x {stride} bytes overflows", header.points))
    })?;
    if body.len() < needed {
        return Err(Error::UnexpectedEnd(data.len()));
    }

    let mut points = Points::with_capacity(header.points);
    for chunk in body[..needed].chunks_exact(stride) {
        let [x, y, z] = layout.map(|(offset, size)| read_float(&chunk[offset..], size));
        points.push(x, y, z);
    }
    Ok(points)
}

fn read_ascii(header: &Header, data: &[u8]) -> Result<Points, Error> {
    let columns = header.xyz_columns()?;
    let body = std::str::from_utf8(&data[header.body..])
        .map_err(|_| Error::InvalidPcd("ascii body is not valid UTF-8".to_string()))?;

    // Every ascii point takes at least six bytes ("0 0 0\n").
    let mut points = Points::with_capacity(header.points.min(body.len() / 6));
    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    for i in 0..header.points {
        let Some(line) = lines.next() else {
            return Err(Error::UnexpectedEnd(data.len()));
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [x, y, z] = columns.map(|c| {
            tokens
                .get(c)
                .and_then(|t| t.parse::<f64>().ok())
                .map(|v| v as f32)
        });
        match (x, y, z) {
            (Some(x), Some(y), Some(z)) => points.push(x, y, z),
            _ => {
                return Err(Error::InvalidPcd(format!("bad point on body line {}", i + 1)));
            }
        }
    }
    Ok(points)
}

/// Decode a PCD file held in memory.
pub fn read_pcd(data: &[u8]) -> Result<Points, Error> {
    let header = parse_header(data)?;
    match header.format {
        DataFormat::Binary => read_binary(&header, data),
        DataFormat::Ascii => read_ascii(&header, data),
    }
}

/// Read and decode the PCD file at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<Points, Error> {
    read_pcd(&fs::read(path)?)
}

/// Encode `points` as a binary `x y z` PCD.
pub fn write_pcd(points: &Points) -> Vec<u8> {
    let n = points.len();
    let header = format!(
        "# .PCD v0.7 - Point Cloud Data file format\n\
         VERSION 0.7\n\
         FIELDS x y z\n\
         SIZE 4 4 4\n\
         TYPE F F F\n\
         COUNT 1 1 1\n\
         WIDTH {n}\n\
         HEIGHT 1\n\
         VIEWPOINT 0 0 0 1 0 0 0\n\
         POINTS {n}\n\
         DATA binary\n"
    );

    let mut out = Vec::with_capacity(header.len() + n * 12);
    out.extend_from_slice(header.as_bytes());
    for (x, y, z) in points.iter() {
        out.extend_from_slice(&x.to_le_bytes());
        out.extend_from_slice(&y.to_le_bytes());
        out.extend_from_slice(&z.to_le_bytes());
    }
    out
}

/// Write `points` to `path` as a binary PCD.
pub fn save(path: impl AsRef<Path>, points: &Points) -> Result<(), Error> {
    fs::write(path, write_pcd(points))?;
    Ok(())
}
