use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use serde::{Deserialize, Serialize};

use rimscore::data::ions::RawIonData;

use crate::error::CrdError;

/// File magic at the start of every CRD file.
pub const CRD_MAGIC: [u8; 4] = *b"CRD\0";
/// Trailer magic marking a completely written file.
pub const CRD_TRAILER: [u8; 4] = *b"OK!\0";
/// The format generation this reader understands.
pub const CRD_VERSION_MAJOR: u32 = 1;

/// Header metadata of a CRD acquisition.
///
/// All integers are little-endian on disk. The channel range
/// `[bin_start, bin_end]` is inclusive and instrument-defined; `delta_t_s`
/// is the wall-clock spacing between shots.
///
/// On-disk layout, in order: magic, version major/minor (`u32` each),
/// `bin_width_ps: u64`, `bin_start: u32`, `bin_end: u32`,
/// `delta_t_s: f64`, `nof_shots: u32`; then per shot a `u32` ion count
/// followed by that many `u32` arrival channels; then the trailer magic.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrdHeader {
    pub version: (u32, u32),
    pub bin_width_ps: u64,
    pub bin_start: u32,
    pub bin_end: u32,
    pub delta_t_s: f64,
    pub nof_shots: u32,
}

impl CrdHeader {
    /// A header describing the given ion data.
    pub fn for_data(data: &RawIonData, delta_t_s: f64) -> Self {
        CrdHeader {
            version: (CRD_VERSION_MAJOR, 0),
            bin_width_ps: data.bin_width_ps,
            bin_start: data.bin_start,
            bin_end: data.bin_end,
            delta_t_s,
            nof_shots: data.nof_shots as u32,
        }
    }
}

/// Reads a CRD file into header metadata plus raw ion data.
///
/// Validates the magic, the format generation, the trailer, and the
/// consistency between announced and stored ion counts. Arrival channels
/// outside the header's channel range are rejected.
pub fn read_crd(path: &Path) -> Result<(CrdHeader, RawIonData), CrdError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != CRD_MAGIC {
        return Err(CrdError::Format(format!(
            "{} does not start with the CRD magic",
            path.display()
        )));
    }

    let major = reader.read_u32::<LittleEndian>()?;
    let minor = reader.read_u32::<LittleEndian>()?;
    if major != CRD_VERSION_MAJOR {
        return Err(CrdError::Format(format!(
            "unsupported CRD format version {major}.{minor}"
        )));
    }

    let header = CrdHeader {
        version: (major, minor),
        bin_width_ps: reader.read_u64::<LittleEndian>()?,
        bin_start: reader.read_u32::<LittleEndian>()?,
        bin_end: reader.read_u32::<LittleEndian>()?,
        delta_t_s: reader.read_f64::<LittleEndian>()?,
        nof_shots: reader.read_u32::<LittleEndian>()?,
    };

    let mut ions_per_shot = Vec::with_capacity(header.nof_shots as usize);
    let mut arrival_bins = Vec::new();
    for _ in 0..header.nof_shots {
        let nof_ions = reader.read_u32::<LittleEndian>()?;
        ions_per_shot.push(nof_ions);
        for _ in 0..nof_ions {
            arrival_bins.push(reader.read_u32::<LittleEndian>()?);
        }
    }

    let mut trailer = [0u8; 4];
    reader.read_exact(&mut trailer)?;
    if trailer != CRD_TRAILER {
        return Err(CrdError::Format(format!(
            "{} is truncated (trailer magic missing)",
            path.display()
        )));
    }

    let raw = RawIonData::new(
        ions_per_shot,
        arrival_bins,
        header.bin_start,
        header.bin_end,
        header.bin_width_ps,
    )?;
    debug!("read {}: {}", path.display(), raw);
    Ok((header, raw))
}

/// Writes ion data to a CRD file in the layout documented on
/// [`CrdHeader`].
pub fn write_crd(path: &Path, header: &CrdHeader, data: &RawIonData) -> Result<(), CrdError> {
    if header.nof_shots as usize != data.nof_shots
        || header.bin_start != data.bin_start
        || header.bin_end != data.bin_end
        || header.bin_width_ps != data.bin_width_ps
    {
        return Err(CrdError::Format(
            "header does not describe the given ion data".to_string(),
        ));
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&CRD_MAGIC)?;
    writer.write_u32::<LittleEndian>(header.version.0)?;
    writer.write_u32::<LittleEndian>(header.version.1)?;
    writer.write_u64::<LittleEndian>(header.bin_width_ps)?;
    writer.write_u32::<LittleEndian>(header.bin_start)?;
    writer.write_u32::<LittleEndian>(header.bin_end)?;
    writer.write_f64::<LittleEndian>(header.delta_t_s)?;
    writer.write_u32::<LittleEndian>(header.nof_shots)?;

    for shot in 0..data.nof_shots {
        let arrivals = data.shot(shot);
        writer.write_u32::<LittleEndian>(arrivals.len() as u32)?;
        for &channel in arrivals {
            writer.write_u32::<LittleEndian>(channel)?;
        }
    }

    writer.write_all(&CRD_TRAILER)?;
    writer.flush()?;
    Ok(())
}
