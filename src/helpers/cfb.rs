//! OLE compound documents, the container of legacy `.xls` workbooks.
//!
//! The whole file is held in memory. Streams are looked up by name in a flat
//! directory; storages are not walked, which is enough for the root-level
//! `Workbook` and `EncryptionInfo` streams.

use crate::error::ParseError;
use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u64;
use crate::helpers::bytes::to_usize;
use crate::helpers::bytes::to_usize_iter;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;

pub(crate) const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
const HEADER_SIZE: usize = 512;
/// Sector ids at or above this value are markers (free, end of chain, ...).
const MAX_REGULAR_SECTOR: usize = 0xFFFF_FFFB;
/// Streams shorter than this live in the mini stream.
const MINI_STREAM_CUTOFF: usize = 4096;
const MINI_SECTOR_SIZE: usize = 64;
const DIRECTORY_ENTRY_SIZE: usize = 128;
const ROOT_ENTRY: &str = "Root Entry";

fn corrupted(message: &str) -> ParseError {
    ParseError::CompoundFile(message.to_owned())
}

pub(crate) struct Cfb {
    directories: HashMap<String, Directory>,
    allocation_table: Vec<usize>,
    sectors: Sectors,
    mini_allocation_table: Vec<usize>,
    mini_sectors: Sectors,
}

impl Cfb {
    pub(crate) fn new(data: &[u8]) -> Result<Self, ParseError> {
        let header = Header::new(data)?;
        let size = header.sector_size()?;
        let sectors = Sectors {
            data: data.to_vec(),
            size,
            offset: size,
        };
        let allocation_table = load_allocation_table(&sectors, &header)?;
        let directories = load_directories(&allocation_table, &sectors, &header)?;
        let mini_allocation_table = if header.mini_table_count > 0 {
            to_usize_iter(&read_chain(&allocation_table, &sectors, header.mini_table_start)?).collect()
        } else {
            Vec::new()
        };
        // The root entry's own stream is the mini stream.
        let mini_stream = match directories.get(ROOT_ENTRY) {
            Some(root) => {
                let mut stream = read_chain(&allocation_table, &sectors, root.start)?;
                stream.truncate(root.size);
                stream
            }
            None => Vec::new(),
        };

        Ok(Self {
            directories,
            allocation_table,
            sectors,
            mini_allocation_table,
            mini_sectors: Sectors {
                data: mini_stream,
                size: MINI_SECTOR_SIZE,
                offset: 0,
            },
        })
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.directories.contains_key(name)
    }

    /// Content of the stream `name`, `None` when there is no such stream.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, ParseError> {
        let Some(directory) = self.directories.get(name) else {
            return Ok(None);
        };
        let mut bytes = if directory.size < MINI_STREAM_CUTOFF {
            read_chain(&self.mini_allocation_table, &self.mini_sectors, directory.start)?
        } else {
            read_chain(&self.allocation_table, &self.sectors, directory.start)?
        };
        if bytes.len() < directory.size {
            Err(corrupted(&format!("stream '{name}' is shorter than its directory entry")))?
        }
        bytes.truncate(directory.size);
        Ok(Some(bytes))
    }
}

/// Collects the allocation table from the sectors listed in the header and
/// in the chain of extension (DIFAT) sectors.
fn load_allocation_table(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, ParseError> {
    let mut table_sectors: Vec<usize> = to_usize_iter(&header.table_sectors).collect();
    let mut count = 0usize;
    let mut index = header.extension_start;
    while index < MAX_REGULAR_SECTOR {
        if count >= header.extension_count {
            Err(corrupted("extension sector chain is longer than declared"))?
        }
        let mut entries: Vec<usize> = to_usize_iter(sectors.get(index)?).collect();
        index = entries.pop().ok_or_else(|| corrupted("empty extension sector"))?;
        table_sectors.extend(entries);
        count += 1;
    }
    if count != header.extension_count {
        Err(corrupted(&format!(
            "expected {} extension sector(s), found {count}",
            header.extension_count
        )))?
    }

    let mut table = Vec::<usize>::new();
    let mut count = 0usize;
    for index in table_sectors.into_iter().filter(|index| *index < MAX_REGULAR_SECTOR) {
        table.extend(to_usize_iter(sectors.get(index)?));
        count += 1;
    }
    if count != header.table_count {
        Err(corrupted(&format!(
            "expected {} allocation sector(s), found {count}",
            header.table_count
        )))?
    }
    Ok(table)
}

fn load_directories(
    allocation_table: &[usize],
    sectors: &Sectors,
    header: &Header,
) -> Result<HashMap<String, Directory>, ParseError> {
    let bytes = read_chain(allocation_table, sectors, header.directory_start)?;
    let directories: HashMap<String, Directory> = bytes
        .chunks_exact(DIRECTORY_ENTRY_SIZE)
        .filter_map(|entry| Directory::new(entry, header.major_version))
        .collect();
    if !directories.contains_key(ROOT_ENTRY) {
        Err(corrupted("missing root directory entry"))?
    }
    Ok(directories)
}

/// Follows a sector chain from `start`. A chain longer than the table is a
/// loop.
fn read_chain(table: &[usize], sectors: &Sectors, start: usize) -> Result<Vec<u8>, ParseError> {
    let mut content = Vec::new();
    let mut index = start;
    let mut visited = 0usize;
    while index < MAX_REGULAR_SECTOR {
        if visited > table.len() {
            Err(corrupted("sector chain loops"))?
        }
        content.extend_from_slice(sectors.get(index)?);
        index = *table
            .get(index)
            .ok_or_else(|| corrupted(&format!("sector {index} is outside the allocation table")))?;
        visited += 1;
    }
    Ok(content)
}

struct Sectors {
    data: Vec<u8>,
    size: usize,
    /// Where sector 0 starts: right after the header for regular sectors, at
    /// the beginning of the mini stream for mini sectors.
    offset: usize,
}

impl Sectors {
    fn get(&self, index: usize) -> Result<&[u8], ParseError> {
        let source = index
            .checked_mul(self.size)
            .and_then(|start| start.checked_add(self.offset))
            .filter(|source| *source < self.data.len())
            .ok_or_else(|| corrupted(&format!("sector {index} is beyond the end of the file")))?;
        let target = self.data.len().min(source + self.size);
        Ok(&self.data[source..target])
    }
}

struct Header {
    major_version: u16,
    sector_shift: u16,
    table_count: usize,
    directory_start: usize,
    mini_table_start: usize,
    mini_table_count: usize,
    extension_start: usize,
    extension_count: usize,
    /// First 109 allocation sector ids, stored in the header itself.
    table_sectors: Vec<u8>,
}

impl Header {
    fn new(data: &[u8]) -> Result<Self, ParseError> {
        let header = data
            .get(..HEADER_SIZE)
            .ok_or_else(|| corrupted("file is shorter than its header"))?;
        let field = |at: usize| to_usize(header, at).ok_or_else(|| corrupted("truncated header"));
        if to_u64(header, 0) != Some(SIGNATURE) {
            Err(corrupted("invalid signature"))?
        }
        Ok(Self {
            major_version: to_u16(header, 26).ok_or_else(|| corrupted("truncated header"))?,
            sector_shift: to_u16(header, 30).ok_or_else(|| corrupted("truncated header"))?,
            table_count: field(44)?,
            directory_start: field(48)?,
            mini_table_start: field(60)?,
            mini_table_count: field(64)?,
            extension_start: field(68)?,
            extension_count: field(72)?,
            table_sectors: header[76..HEADER_SIZE].to_vec(),
        })
    }

    fn sector_size(&self) -> Result<usize, ParseError> {
        match (self.major_version, self.sector_shift) {
            (3, 9) => Ok(512),
            // The rest of the first 4096-byte sector is zero padding.
            (4, 12) => Ok(4096),
            (version, shift) => Err(corrupted(&format!(
                "sector size 2^{shift} is invalid for version {version}"
            ))),
        }
    }
}

#[derive(Debug)]
struct Directory {
    start: usize,
    size: usize,
}

impl Directory {
    /// Name and location of an allocated entry; unused slots yield `None`.
    fn new(entry: &[u8], major_version: u16) -> Option<(String, Directory)> {
        if entry.get(66).copied().unwrap_or(0) == 0 {
            return None;
        }
        let length = usize::from(to_u16(entry, 64)?).min(64);
        let (name, _) = UTF_16LE.decode_without_bom_handling(&entry[..length]);
        let name = match name.find('\0') {
            Some(position) => name[..position].to_owned(),
            None => name.into_owned(),
        };
        let start = to_usize(entry, 116)?;
        // Version 3 files may leave garbage in the high half of the size.
        let size = match major_version {
            3 => to_u64(entry, 120)? & 0xFFFF_FFFF,
            _ => to_u64(entry, 120)?,
        };
        Some((
            name,
            Directory {
                start,
                size: usize::try_from(size).ok()?,
            },
        ))
    }
}
