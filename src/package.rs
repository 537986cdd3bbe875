use crate::error::AgreementError;
use crate::flate_native::{crc32, deflate_raw_parallel};
use std::io::Write;

pub(crate) const LOCAL_HEADER_SIG: u32 = 0x0403_4B50;
pub(crate) const CENTRAL_HEADER_SIG: u32 = 0x0201_4B50;
pub(crate) const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4B50;

pub(crate) const METHOD_STORED: u16 = 0;
pub(crate) const METHOD_DEFLATE: u16 = 8;

const VERSION_NEEDED: u16 = 20;
// 1980-01-01 00:00:00, the earliest DOS timestamp. Fixed so output is reproducible.
const DOS_TIME: u16 = 0;
const DOS_DATE: u16 = (1 << 5) | 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PackageOptions {
    pub compress: bool,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

#[derive(Debug, Clone)]
struct CentralEntry {
    name: String,
    method: u16,
    crc: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    local_header_offset: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PackageSummary {
    pub parts: usize,
    pub deflated_parts: usize,
    pub uncompressed_bytes: usize,
    pub bytes_written: usize,
}

/// Streams an OPC (ZIP) container. Parts are written in the order added.
pub(crate) struct PackageWriter<'a, W: Write> {
    writer: &'a mut W,
    offset: usize,
    options: PackageOptions,
    entries: Vec<CentralEntry>,
    deflated_parts: usize,
    uncompressed_bytes: usize,
}

impl<'a, W: Write> PackageWriter<'a, W> {
    pub(crate) fn new(writer: &'a mut W, options: PackageOptions) -> Self {
        Self {
            writer,
            offset: 0,
            options,
            entries: Vec::new(),
            deflated_parts: 0,
            uncompressed_bytes: 0,
        }
    }

    pub(crate) fn add_part(&mut self, name: &str, data: &[u8]) -> Result<(), AgreementError> {
        if name.is_empty() || name.starts_with('/') {
            return Err(AgreementError::Serialization(format!(
                "invalid part name '{}'",
                name
            )));
        }
        if self.entries.iter().any(|entry| entry.name == name) {
            return Err(AgreementError::Serialization(format!(
                "duplicate part '{}'",
                name
            )));
        }
        let name_len = fit_u16(name.len(), "part name length")?;
        let uncompressed_size = fit_u32(data.len(), "part size")?;
        let local_header_offset = fit_u32(self.offset, "package offset")?;
        let crc = crc32(data);

        let deflated = if self.options.compress {
            let encoded = deflate_raw_parallel(data);
            (encoded.len() < data.len()).then_some(encoded)
        } else {
            None
        };
        let (method, payload): (u16, &[u8]) = match deflated.as_deref() {
            Some(encoded) => (METHOD_DEFLATE, encoded),
            None => (METHOD_STORED, data),
        };
        let compressed_size = fit_u32(payload.len(), "compressed part size")?;

        let mut header = Vec::with_capacity(30 + name.len());
        put_u32(&mut header, LOCAL_HEADER_SIG);
        put_u16(&mut header, VERSION_NEEDED);
        put_u16(&mut header, 0);
        put_u16(&mut header, method);
        put_u16(&mut header, DOS_TIME);
        put_u16(&mut header, DOS_DATE);
        put_u32(&mut header, crc);
        put_u32(&mut header, compressed_size);
        put_u32(&mut header, uncompressed_size);
        put_u16(&mut header, name_len);
        put_u16(&mut header, 0);
        header.extend_from_slice(name.as_bytes());

        self.write_bytes(&header)?;
        self.write_bytes(payload)?;

        if method == METHOD_DEFLATE {
            self.deflated_parts += 1;
        }
        self.uncompressed_bytes += data.len();
        self.entries.push(CentralEntry {
            name: name.to_string(),
            method,
            crc,
            compressed_size,
            uncompressed_size,
            local_header_offset,
        });
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<PackageSummary, AgreementError> {
        let entry_count = fit_u16(self.entries.len(), "part count")?;
        let central_start = fit_u32(self.offset, "central directory offset")?;

        let mut central = Vec::new();
        for entry in &self.entries {
            put_u32(&mut central, CENTRAL_HEADER_SIG);
            put_u16(&mut central, VERSION_NEEDED);
            put_u16(&mut central, VERSION_NEEDED);
            put_u16(&mut central, 0);
            put_u16(&mut central, entry.method);
            put_u16(&mut central, DOS_TIME);
            put_u16(&mut central, DOS_DATE);
            put_u32(&mut central, entry.crc);
            put_u32(&mut central, entry.compressed_size);
            put_u32(&mut central, entry.uncompressed_size);
            put_u16(&mut central, entry.name.len() as u16);
            put_u16(&mut central, 0); // extra
            put_u16(&mut central, 0); // comment
            put_u16(&mut central, 0); // disk
            put_u16(&mut central, 0); // internal attrs
            put_u32(&mut central, 0); // external attrs
            put_u32(&mut central, entry.local_header_offset);
            central.extend_from_slice(entry.name.as_bytes());
        }
        let central_size = fit_u32(central.len(), "central directory size")?;
        self.write_bytes(&central)?;

        let mut end = Vec::with_capacity(22);
        put_u32(&mut end, END_OF_CENTRAL_DIR_SIG);
        put_u16(&mut end, 0);
        put_u16(&mut end, 0);
        put_u16(&mut end, entry_count);
        put_u16(&mut end, entry_count);
        put_u32(&mut end, central_size);
        put_u32(&mut end, central_start);
        put_u16(&mut end, 0);
        self.write_bytes(&end)?;
        self.writer.flush()?;

        Ok(PackageSummary {
            parts: self.entries.len(),
            deflated_parts: self.deflated_parts,
            uncompressed_bytes: self.uncompressed_bytes,
            bytes_written: self.offset,
        })
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), AgreementError> {
        self.writer.write_all(data)?;
        self.offset += data.len();
        Ok(())
    }
}

fn fit_u16(value: usize, what: &str) -> Result<u16, AgreementError> {
    u16::try_from(value)
        .map_err(|_| AgreementError::Serialization(format!("{} {} exceeds zip limit", what, value)))
}

fn fit_u32(value: usize, what: &str) -> Result<u32, AgreementError> {
    u32::try_from(value)
        .map_err(|_| AgreementError::Serialization(format!("{} {} exceeds zip limit", what, value)))
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_package<W: Write>(
    writer: &mut W,
    parts: &[(&str, Vec<u8>)],
    options: PackageOptions,
) -> Result<PackageSummary, AgreementError> {
    let mut package = PackageWriter::new(writer, options);
    for (name, data) in parts {
        package.add_part(name, data)?;
    }
    package.finish()
}
