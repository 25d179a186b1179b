#![allow(dead_code)]

use lzma_step::compress::Op;
use lzma_step::{Progress, Status};
use std::collections::HashMap;

pub fn init_logging() {
    #[cfg(feature = "enable_logging")]
    let _ = env_logger::try_init();
}

/// Text-like data with long repeats and a sprinkle of noise.
pub fn sample(len: usize, seed: u32) -> Vec<u8> {
    const WORDS: [&[u8]; 12] = [
        b"range ", b"coder ", b"literal ", b"match ", b"distance ", b"the ", b"window ",
        b"chunk ", b"state ", b"\n", b"0123456789", b"probability ",
    ];
    let mut x = seed | 1;
    let mut next = move || {
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        x
    };
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        let r = next();
        match r % 16 {
            0 => data.push(r as u8),
            1 if data.len() > 64 => {
                let start = (next() as usize) % (data.len() - 32);
                let copy: Vec<u8> = data[start..start + 32].to_vec();
                data.extend_from_slice(&copy);
            }
            _ => data.extend_from_slice(WORDS[(r >> 8) as usize % WORDS.len()]),
        }
    }
    data.truncate(len);
    data
}

fn match_len(data: &[u8], pos: usize, dist: usize) -> usize {
    let mut len = 0;
    while pos + len < data.len() && len < 273 && data[pos + len] == data[pos + len - dist] {
        len += 1;
    }
    len
}

/// A greedy parse of `data` into operations using every token kind.
pub fn greedy_ops(data: &[u8], dict_size: usize) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut last: HashMap<[u8; 3], usize> = HashMap::new();
    let mut reps = [1usize; 4];
    let mut pos = 0;
    while pos < data.len() {
        let mut op = Op::Literal(data[pos]);
        let mut best = 1;
        for (index, &dist) in reps.iter().enumerate() {
            if dist <= pos {
                let len = match_len(data, pos, dist);
                if len >= 2 && len > best {
                    op = Op::Rep {
                        index,
                        len: len as u32,
                    };
                    best = len;
                }
            }
        }
        if pos + 3 <= data.len() {
            let key = [data[pos], data[pos + 1], data[pos + 2]];
            if let Some(&prev) = last.get(&key) {
                let dist = pos - prev;
                let len = match_len(data, pos, dist);
                if dist <= dict_size && len > best + 1 {
                    op = Op::Match {
                        distance: dist as u32,
                        len: len as u32,
                    };
                    best = len;
                }
            }
        }
        if best == 1 && pos >= reps[0] && data[pos - reps[0]] == data[pos] {
            op = Op::ShortRep;
        }

        match op {
            Op::Match { distance, .. } => {
                reps.copy_within(0..3, 1);
                reps[0] = distance as usize;
            }
            Op::Rep { index, .. } => {
                let dist = reps[index];
                reps.copy_within(0..index, 1);
                reps[0] = dist;
            }
            Op::Literal(_) | Op::ShortRep => {}
        }
        for p in pos..pos + best {
            if p + 3 <= data.len() {
                last.insert([data[p], data[p + 1], data[p + 2]], p);
            }
        }
        ops.push(op);
        pos += best;
    }
    ops
}

/// Drive a step decoder with input and output windows cycling through
/// `in_steps` and `out_steps`.
pub fn decode_stepped<F>(mut decode: F, stream: &[u8], in_steps: &[usize], out_steps: &[usize]) -> Vec<u8>
where
    F: FnMut(&[u8], &mut [u8]) -> Progress,
{
    let mut out = Vec::new();
    let mut input = stream;
    let mut i = 0;
    loop {
        let take = in_steps[i % in_steps.len()].min(input.len());
        let mut buf = vec![0u8; out_steps[i % out_steps.len()]];
        let progress = decode(&input[..take], &mut buf);
        assert!(progress.consumed <= take);
        out.extend_from_slice(&buf[..progress.written]);
        input = &input[progress.consumed..];
        if progress.status == Status::Finished {
            return out;
        }
        i += 1;
        assert!(i < 10_000_000, "decoder does not make progress");
    }
}
