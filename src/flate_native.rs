use rayon::prelude::*;

const LZ77_CHUNK_BYTES: usize = 128 * 1024;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 258;
const MAX_DISTANCE: usize = 32 * 1024;
const MAX_CHAIN_STEPS: usize = 64;
const HASH_BITS: usize = 15;
const HASH_SIZE: usize = 1 << HASH_BITS;
const MAX_CODE_BITS: usize = 15;

const LENGTH_BASE: [usize; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

const LENGTH_EXTRA_BITS: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

const DIST_BASE: [usize; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

const DIST_EXTRA_BITS: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

// Order in which code-length code lengths are sent in a dynamic block header.
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

const CRC32_TABLE: [u32; 256] = build_crc32_table();

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0usize;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

/// CRC-32 (IEEE, reflected) as stored in ZIP local and central headers.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    crc ^ 0xFFFF_FFFF
}

#[derive(Clone, Copy, Debug)]
enum Token {
    Literal(u8),
    Match { len: u16, dist: u16 },
}

#[derive(Clone, Debug)]
struct ChunkPlan {
    tokens: Vec<Token>,
}

#[derive(Default)]
struct BitWriter {
    out: Vec<u8>,
    bit_buf: u64,
    bit_count: u8,
}

impl BitWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
            bit_buf: 0,
            bit_count: 0,
        }
    }

    fn write_bits(&mut self, bits: u32, count: u8) {
        if count == 0 {
            return;
        }
        self.bit_buf |= (bits as u64) << self.bit_count;
        self.bit_count += count;
        while self.bit_count >= 8 {
            self.out.push((self.bit_buf & 0xFF) as u8);
            self.bit_buf >>= 8;
            self.bit_count -= 8;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.out.push((self.bit_buf & 0xFF) as u8);
            self.bit_buf = 0;
            self.bit_count = 0;
        }
        self.out
    }
}

fn chunk_ranges(total_len: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    if total_len == 0 {
        return vec![(0, 0)];
    }
    let chunk_size = chunk_size.max(1);
    let mut out = Vec::with_capacity(total_len.div_ceil(chunk_size));
    let mut start = 0usize;
    while start < total_len {
        let end = (start + chunk_size).min(total_len);
        out.push((start, end));
        start = end;
    }
    out
}

fn hash3(data: &[u8], i: usize) -> usize {
    let v = ((data[i] as u32) << 16) ^ ((data[i + 1] as u32) << 8) ^ (data[i + 2] as u32);
    (v.wrapping_mul(0x1E35_A7BD) >> (32 - HASH_BITS)) as usize
}

fn match_len(data: &[u8], a: usize, b: usize, max_len: usize) -> usize {
    let mut l = 0usize;
    while l < max_len && data[a + l] == data[b + l] {
        l += 1;
    }
    l
}

// Matches never reach back across a chunk boundary, so chunks plan independently.
fn plan_lz77_chunk(data: &[u8]) -> ChunkPlan {
    let n = data.len();
    if n == 0 {
        return ChunkPlan { tokens: Vec::new() };
    }

    let mut head = vec![-1_i32; HASH_SIZE];
    let mut prev = vec![-1_i32; n];
    let mut tokens = Vec::with_capacity(n / 2);

    let mut i = 0usize;
    while i < n {
        if i + MIN_MATCH > n {
            tokens.push(Token::Literal(data[i]));
            i += 1;
            continue;
        }

        let h = hash3(data, i);
        let mut cand = head[h];
        prev[i] = cand;
        head[h] = i as i32;

        let mut best_len = 0usize;
        let mut best_dist = 0usize;
        let mut steps = 0usize;

        while cand >= 0 && steps < MAX_CHAIN_STEPS {
            let c = cand as usize;
            let dist = i - c;
            if dist > MAX_DISTANCE {
                break;
            }

            if data[c] == data[i] && data[c + 1] == data[i + 1] && data[c + 2] == data[i + 2] {
                let max_len = MAX_MATCH.min(n - i);
                let len = match_len(data, c, i, max_len);
                if len >= MIN_MATCH && (len > best_len || (len == best_len && dist < best_dist)) {
                    best_len = len;
                    best_dist = dist;
                    if best_len == MAX_MATCH {
                        break;
                    }
                }
            }

            cand = prev[c];
            steps += 1;
        }

        if best_len >= MIN_MATCH {
            tokens.push(Token::Match {
                len: best_len as u16,
                dist: best_dist as u16,
            });

            let end = (i + best_len).min(n);
            let mut j = i + 1;
            while j < end {
                if j + MIN_MATCH <= n {
                    let hj = hash3(data, j);
                    prev[j] = head[hj];
                    head[hj] = j as i32;
                }
                j += 1;
            }

            i += best_len;
        } else {
            tokens.push(Token::Literal(data[i]));
            i += 1;
        }
    }

    ChunkPlan { tokens }
}

fn reverse_bits(mut value: u16, len: u8) -> u16 {
    let mut out = 0u16;
    for _ in 0..len {
        out = (out << 1) | (value & 1);
        value >>= 1;
    }
    out
}

fn fixed_litlen_code(sym: u16) -> (u16, u8) {
    match sym {
        0..=143 => (0x30 + sym, 8),
        144..=255 => (0x190 + (sym - 144), 9),
        256..=279 => (sym - 256, 7),
        280..=287 => (0x0C0 + (sym - 280), 8),
        _ => (0, 0),
    }
}

fn write_fixed_litlen(bw: &mut BitWriter, sym: u16) {
    let (code, len) = fixed_litlen_code(sym);
    let bits = reverse_bits(code, len) as u32;
    bw.write_bits(bits, len);
}

fn write_fixed_dist(bw: &mut BitWriter, sym: u16) {
    let bits = reverse_bits(sym, 5) as u32;
    bw.write_bits(bits, 5);
}

fn length_to_symbol(len: usize) -> (u16, u8, u16) {
    if len >= MAX_MATCH {
        return (285, 0, 0);
    }
    for (idx, (&base, &extra)) in LENGTH_BASE.iter().zip(LENGTH_EXTRA_BITS.iter()).enumerate() {
        let max = if extra == 0 {
            base
        } else {
            base + ((1usize << extra) - 1)
        };
        if len <= max {
            let sym = 257 + idx as u16;
            let extra_val = (len - base) as u16;
            return (sym, extra, extra_val);
        }
    }
    (285, 0, 0)
}

fn dist_to_symbol(dist: usize) -> (u16, u8, u16) {
    for (idx, (&base, &extra)) in DIST_BASE.iter().zip(DIST_EXTRA_BITS.iter()).enumerate() {
        let max = if extra == 0 {
            base
        } else {
            base + ((1usize << extra) - 1)
        };
        if dist <= max {
            let sym = idx as u16;
            let extra_val = (dist - base) as u16;
            return (sym, extra, extra_val);
        }
    }
    (0, 0, 0)
}

fn encode_chunk_fixed_huffman(bw: &mut BitWriter, chunk: &ChunkPlan, final_block: bool) {
    // BFINAL + BTYPE(01=fixed Huffman), packed LSB-first.
    let header = (if final_block { 1u32 } else { 0u32 }) | (0b01 << 1);
    bw.write_bits(header, 3);

    for token in &chunk.tokens {
        match *token {
            Token::Literal(byte) => {
                write_fixed_litlen(bw, byte as u16);
            }
            Token::Match { len, dist } => {
                let (len_sym, len_extra_bits, len_extra_val) = length_to_symbol(len as usize);
                write_fixed_litlen(bw, len_sym);
                if len_extra_bits > 0 {
                    bw.write_bits(len_extra_val as u32, len_extra_bits);
                }

                let (dist_sym, dist_extra_bits, dist_extra_val) = dist_to_symbol(dist as usize);
                write_fixed_dist(bw, dist_sym);
                if dist_extra_bits > 0 {
                    bw.write_bits(dist_extra_val as u32, dist_extra_bits);
                }
            }
        }
    }

    // End-of-block symbol.
    write_fixed_litlen(bw, 256);
}

/// Raw DEFLATE stream (no zlib wrapper), the form ZIP method 8 expects.
pub(crate) fn deflate_raw_parallel(data: &[u8]) -> Vec<u8> {
    let ranges = chunk_ranges(data.len(), LZ77_CHUNK_BYTES);

    let plans: Vec<ChunkPlan> = ranges
        .par_iter()
        .map(|(start, end)| plan_lz77_chunk(&data[*start..*end]))
        .collect();

    let mut bw = BitWriter::with_capacity(data.len().saturating_mul(2) + 64);
    for (idx, plan) in plans.iter().enumerate() {
        let final_block = idx + 1 == plans.len();
        encode_chunk_fixed_huffman(&mut bw, plan, final_block);
    }
    bw.finish()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InflateError {
    UnexpectedEof,
    InvalidBlockType,
    StoredLengthMismatch,
    InvalidCode,
    InvalidDistance,
}

impl std::fmt::Display for InflateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            InflateError::UnexpectedEof => "unexpected end of deflate stream",
            InflateError::InvalidBlockType => "invalid deflate block type",
            InflateError::StoredLengthMismatch => "stored block length check failed",
            InflateError::InvalidCode => "invalid huffman code",
            InflateError::InvalidDistance => "distance reaches before start of output",
        };
        f.write_str(message)
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u32,
    bit_count: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buf: 0,
            bit_count: 0,
        }
    }

    fn bits(&mut self, count: u8) -> Result<u32, InflateError> {
        while self.bit_count < count {
            let byte = *self.data.get(self.pos).ok_or(InflateError::UnexpectedEof)?;
            self.pos += 1;
            self.bit_buf |= (byte as u32) << self.bit_count;
            self.bit_count += 8;
        }
        let value = self.bit_buf & ((1u32 << count) - 1);
        self.bit_buf >>= count;
        self.bit_count -= count;
        Ok(value)
    }

    fn align_to_byte(&mut self) {
        self.bit_buf = 0;
        self.bit_count = 0;
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8], InflateError> {
        let end = self.pos.checked_add(len).ok_or(InflateError::UnexpectedEof)?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(InflateError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }
}

// Canonical Huffman table: code counts per length plus symbols ordered by code.
struct Huffman {
    counts: [u16; MAX_CODE_BITS + 1],
    symbols: Vec<u16>,
}

impl Huffman {
    fn from_lengths(lengths: &[u8]) -> Self {
        let mut counts = [0u16; MAX_CODE_BITS + 1];
        for &len in lengths {
            counts[len as usize] += 1;
        }
        let mut offsets = [0u16; MAX_CODE_BITS + 2];
        for len in 1..=MAX_CODE_BITS {
            offsets[len + 1] = offsets[len] + counts[len];
        }
        let mut symbols = vec![0u16; lengths.len()];
        for (sym, &len) in lengths.iter().enumerate() {
            if len != 0 {
                symbols[offsets[len as usize] as usize] = sym as u16;
                offsets[len as usize] += 1;
            }
        }
        Self { counts, symbols }
    }

    fn decode(&self, reader: &mut BitReader<'_>) -> Result<u16, InflateError> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=MAX_CODE_BITS {
            code |= reader.bits(1)? as i32;
            let count = self.counts[len] as i32;
            if code - first < count {
                return self
                    .symbols
                    .get((index + code - first) as usize)
                    .copied()
                    .ok_or(InflateError::InvalidCode);
            }
            index += count;
            first += count;
            first <<= 1;
            code <<= 1;
        }
        Err(InflateError::InvalidCode)
    }
}

fn fixed_tables() -> (Huffman, Huffman) {
    let mut litlen = [0u8; 288];
    for (sym, len) in litlen.iter_mut().enumerate() {
        *len = match sym {
            0..=143 => 8,
            144..=255 => 9,
            256..=279 => 7,
            _ => 8,
        };
    }
    (Huffman::from_lengths(&litlen), Huffman::from_lengths(&[5u8; 30]))
}

fn dynamic_tables(reader: &mut BitReader<'_>) -> Result<(Huffman, Huffman), InflateError> {
    let hlit = reader.bits(5)? as usize + 257;
    let hdist = reader.bits(5)? as usize + 1;
    let hclen = reader.bits(4)? as usize + 4;

    let mut code_lengths = [0u8; 19];
    for &slot in CODE_LENGTH_ORDER.iter().take(hclen) {
        code_lengths[slot] = reader.bits(3)? as u8;
    }
    let code_length_table = Huffman::from_lengths(&code_lengths);

    let mut lengths = vec![0u8; hlit + hdist];
    let mut idx = 0usize;
    while idx < lengths.len() {
        let sym = code_length_table.decode(reader)?;
        let (value, repeat) = match sym {
            0..=15 => (sym as u8, 1),
            16 => {
                let prev = *idx
                    .checked_sub(1)
                    .and_then(|p| lengths.get(p))
                    .ok_or(InflateError::InvalidCode)?;
                (prev, 3 + reader.bits(2)? as usize)
            }
            17 => (0, 3 + reader.bits(3)? as usize),
            18 => (0, 11 + reader.bits(7)? as usize),
            _ => return Err(InflateError::InvalidCode),
        };
        if idx + repeat > lengths.len() {
            return Err(InflateError::InvalidCode);
        }
        lengths[idx..idx + repeat].fill(value);
        idx += repeat;
    }

    Ok((
        Huffman::from_lengths(&lengths[..hlit]),
        Huffman::from_lengths(&lengths[hlit..]),
    ))
}

fn inflate_codes(
    reader: &mut BitReader<'_>,
    out: &mut Vec<u8>,
    litlen: &Huffman,
    dist: &Huffman,
) -> Result<(), InflateError> {
    loop {
        let sym = litlen.decode(reader)? as usize;
        match sym {
            0..=255 => out.push(sym as u8),
            256 => return Ok(()),
            257..=285 => {
                let idx = sym - 257;
                let len = LENGTH_BASE[idx] + reader.bits(LENGTH_EXTRA_BITS[idx])? as usize;
                let dsym = dist.decode(reader)? as usize;
                if dsym >= DIST_BASE.len() {
                    return Err(InflateError::InvalidDistance);
                }
                let distance = DIST_BASE[dsym] + reader.bits(DIST_EXTRA_BITS[dsym])? as usize;
                if distance > out.len() {
                    return Err(InflateError::InvalidDistance);
                }
                let start = out.len() - distance;
                for k in 0..len {
                    let byte = out[start + k];
                    out.push(byte);
                }
            }
            _ => return Err(InflateError::InvalidCode),
        }
    }
}

/// Decodes a raw DEFLATE stream (stored, fixed and dynamic blocks).
pub(crate) fn inflate_raw(data: &[u8], size_hint: usize) -> Result<Vec<u8>, InflateError> {
    let mut reader = BitReader::new(data);
    let mut out = Vec::with_capacity(size_hint);
    loop {
        let final_block = reader.bits(1)? == 1;
        match reader.bits(2)? {
            0 => {
                reader.align_to_byte();
                let header = reader.take_bytes(4)?;
                let len = u16::from_le_bytes([header[0], header[1]]);
                let nlen = u16::from_le_bytes([header[2], header[3]]);
                if len != !nlen {
                    return Err(InflateError::StoredLengthMismatch);
                }
                out.extend_from_slice(reader.take_bytes(len as usize)?);
            }
            1 => {
                let (litlen, dist) = fixed_tables();
                inflate_codes(&mut reader, &mut out, &litlen, &dist)?;
            }
            2 => {
                let (litlen, dist) = dynamic_tables(&mut reader)?;
                inflate_codes(&mut reader, &mut out, &litlen, &dist)?;
            }
            _ => return Err(InflateError::InvalidBlockType),
        }
        if final_block {
            return Ok(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_reference_vector() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn deflate_roundtrip_small() {
        let src = b"hello native flate";
        let encoded = deflate_raw_parallel(src);
        assert_eq!(inflate_raw(&encoded, src.len()).expect("inflate"), src);
    }

    #[test]
    fn deflate_roundtrip_large_repetitive() {
        let src = vec![0xAB; 300_000];
        let encoded = deflate_raw_parallel(&src);
        assert!(encoded.len() < src.len() / 10);
        assert_eq!(inflate_raw(&encoded, src.len()).expect("inflate"), src);
    }

    #[test]
    fn deflate_roundtrip_empty() {
        let encoded = deflate_raw_parallel(&[]);
        assert!(inflate_raw(&encoded, 0).expect("inflate").is_empty());
    }

    #[test]
    fn deflate_roundtrip_markup() {
        let src = "<w:p><w:r><w:t>Illustration</w:t></w:r></w:p>".repeat(500);
        let encoded = deflate_raw_parallel(src.as_bytes());
        assert!(encoded.len() < src.len());
        let decoded = inflate_raw(&encoded, src.len()).expect("inflate");
        assert_eq!(decoded, src.as_bytes());
    }

    #[test]
    fn max_length_match_uses_code_285() {
        assert_eq!(length_to_symbol(258), (285, 0, 0));
        assert_eq!(length_to_symbol(257), (284, 5, 30));
        assert_eq!(length_to_symbol(3), (257, 0, 0));
    }

    #[test]
    fn deflate_is_deterministic_across_thread_counts() {
        let src: Vec<u8> = (0..320_000).map(|i| (i % 239) as u8).collect();
        let run_with_threads = |threads: usize| -> Vec<u8> {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .expect("thread pool");
            pool.install(|| deflate_raw_parallel(&src))
        };
        let a = run_with_threads(1);
        let b = run_with_threads(4);
        assert_eq!(a, b);
    }

    #[test]
    fn inflate_reads_stored_blocks() {
        // BFINAL=1, BTYPE=00, LEN=5, NLEN=!5, payload.
        let mut stream = vec![0x01, 0x05, 0x00, 0xFA, 0xFF];
        stream.extend_from_slice(b"hello");
        assert_eq!(inflate_raw(&stream, 5).expect("inflate"), b"hello");
    }

    fn lcg_text(len: usize) -> Vec<u8> {
        let mut x: u32 = 12345;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12345) & 0x7FFF_FFFF;
                b"abcd"[((x >> 16) % 4) as usize]
            })
            .collect()
    }

    #[test]
    fn inflate_reads_dynamic_blocks() {
        // zlib level 9, raw deflate of lcg_text(400); the block is BTYPE=10.
        let encoded: [u8; 154] = [
            0x25, 0x90, 0x81, 0x0d, 0xc0, 0x30, 0x08, 0xc3, 0x6e, 0x85, 0xf0, 0xff, 0x0d, 0xb5,
            0x53, 0x6d, 0x53, 0x21, 0x50, 0x43, 0x36, 0xb3, 0xb9, 0xdd, 0x64, 0xe7, 0x72, 0x37,
            0xcb, 0x73, 0xeb, 0x39, 0x56, 0x82, 0x8a, 0x1c, 0x84, 0xb5, 0x85, 0x83, 0x77, 0x11,
            0x53, 0x8d, 0xce, 0x41, 0xb7, 0xcb, 0x36, 0x22, 0xfb, 0x6e, 0x28, 0x56, 0x54, 0x08,
            0x2f, 0x1c, 0x58, 0xe4, 0x7b, 0x77, 0xa4, 0xc6, 0x5e, 0x65, 0x02, 0xba, 0x33, 0xa7,
            0x75, 0x2e, 0x35, 0x02, 0x4a, 0x1f, 0x19, 0xa4, 0x74, 0x24, 0x5b, 0x12, 0x15, 0x09,
            0xac, 0x23, 0x55, 0xc7, 0xb4, 0x63, 0xc0, 0x4e, 0xba, 0xba, 0x75, 0xe8, 0x50, 0xe6,
            0x2f, 0x4f, 0xe6, 0xf8, 0xff, 0x95, 0x54, 0x2b, 0xd6, 0x74, 0x31, 0xe9, 0x4f, 0x70,
            0x77, 0x87, 0xea, 0xf6, 0x2f, 0x25, 0xe1, 0x73, 0xeb, 0x00, 0x5a, 0x0a, 0x6f, 0xf5,
            0xb7, 0x4e, 0x01, 0x6e, 0x92, 0xd6, 0x6d, 0x48, 0xbd, 0x9f, 0xd6, 0x75, 0x2c, 0xfe,
            0xef, 0x55, 0x54, 0x3d, 0xd6, 0xac, 0xde, 0xb5, 0x5b, 0x2b, 0x9a, 0xa0, 0xf6, 0x00,
        ];
        assert_eq!((encoded[0] >> 1) & 0b11, 2);
        let decoded = inflate_raw(&encoded, 400).expect("inflate");
        assert_eq!(decoded, lcg_text(400));
    }

    #[test]
    fn inflate_rejects_truncated_and_corrupt_input() {
        let encoded = deflate_raw_parallel(b"some text that is long enough to matter");
        let truncated = &encoded[..encoded.len() / 2];
        assert!(inflate_raw(truncated, 0).is_err());
        assert_eq!(inflate_raw(&[0x07], 0), Err(InflateError::InvalidBlockType));
        let bad_stored = [0x01, 0x05, 0x00, 0x00, 0x00];
        assert_eq!(
            inflate_raw(&bad_stored, 0),
            Err(InflateError::StoredLengthMismatch)
        );
    }
}
