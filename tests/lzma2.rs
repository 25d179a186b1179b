mod common;

use common::{decode_stepped, greedy_ops, init_logging, sample};
use lzma_step::compress::{ChunkMode, Lzma2Encoder, Lzma2Options, Op};
use lzma_step::decompress::Lzma2Decoder;
use lzma_step::error::{lzma2::Lzma2Error, CodecError, Unsupported};
use lzma_step::{LzmaProperties, Status};
use std::io::Cursor;

fn lzma2_from_ops(options: &Lzma2Options, ops: &[Op], out_step: usize) -> Vec<u8> {
    let mut encoder = Lzma2Encoder::new(options);
    let mut out = Vec::new();
    let mut buf = vec![0u8; out_step];
    let mut ops = ops;
    loop {
        let progress = encoder.encode_ops(ops, &mut buf).unwrap();
        out.extend_from_slice(&buf[..progress.written]);
        ops = &ops[progress.consumed..];
        if progress.status == Status::Ok {
            break;
        }
    }
    loop {
        let progress = encoder.finish(&mut buf).unwrap();
        out.extend_from_slice(&buf[..progress.written]);
        if progress.is_finished() {
            return out;
        }
    }
}

fn check_with_lzma_rs(stream: &[u8], data: &[u8]) {
    let mut decoded = Vec::new();
    lzma_rs::lzma2_decompress(&mut Cursor::new(stream), &mut decoded).unwrap();
    assert_eq!(decoded, data);
}

#[test]
fn copy_chunks_70000() {
    init_logging();
    let data = sample(70_000, 42);
    let options = Lzma2Options {
        mode: ChunkMode::Copy,
        ..Lzma2Options::default()
    };
    let mut stream = Vec::new();
    lzma_step::lzma2_compress_with_options(&mut Cursor::new(&data[..]), &mut stream, &options)
        .unwrap();
    assert_eq!(stream.len(), 70_000 + 3 + 3 + 1);
    assert_eq!(stream[0], 0x01);
    assert_eq!(stream[3 + 65536], 0x02);

    let mut decoder = Lzma2Decoder::new(1 << 16);
    let out = decode_stepped(|i, o| decoder.decode(i, o).unwrap(), &stream, &[1], &[2]);
    assert_eq!(out, data);
    check_with_lzma_rs(&stream, &data);
}

#[test]
fn lzma_chunks_with_matches() {
    init_logging();
    let data = sample(300_000, 11);
    let ops = greedy_ops(&data, 1 << 16);
    for &chunk_size in &[273, 5000, 1 << 21] {
        let options = Lzma2Options {
            dict_size: 1 << 16,
            chunk_size,
            ..Lzma2Options::default()
        };
        let stream = lzma2_from_ops(&options, &ops, 1 << 16);
        assert!(stream.len() < data.len());

        let mut decoder = Lzma2Decoder::new(1 << 16);
        let out = decode_stepped(
            |i, o| decoder.decode(i, o).unwrap(),
            &stream,
            &[7, 1, 300],
            &[1000, 3],
        );
        assert_eq!(out, data);
        check_with_lzma_rs(&stream, &data);
    }
}

#[test]
fn output_windows_do_not_change_the_stream() {
    init_logging();
    let data = sample(20_000, 5);
    let ops = greedy_ops(&data, 1 << 16);
    let options = Lzma2Options {
        chunk_size: 4000,
        ..Lzma2Options::default()
    };
    let reference = lzma2_from_ops(&options, &ops, 1 << 20);
    for &out_step in &[1, 6, 1000] {
        assert_eq!(lzma2_from_ops(&options, &ops, out_step), reference);
    }
}

#[test]
fn literal_only_io_helpers() {
    init_logging();
    let data = sample(100_000, 9);
    let mut stream = Vec::new();
    lzma_step::lzma2_compress(&mut Cursor::new(&data[..]), &mut stream).unwrap();

    let mut decoded = Vec::new();
    lzma_step::lzma2_decompress(&mut Cursor::new(&stream[..]), &mut decoded).unwrap();
    assert_eq!(decoded, data);
    check_with_lzma_rs(&stream, &data);
}

#[test]
fn decode_lzma_rs_output() {
    init_logging();
    let data = sample(150_000, 21);
    let mut stream = Vec::new();
    lzma_rs::lzma2_compress(&mut Cursor::new(&data[..]), &mut stream).unwrap();

    let mut decoded = Vec::new();
    lzma_step::lzma2_decompress(&mut Cursor::new(&stream[..]), &mut decoded).unwrap();
    assert_eq!(decoded, data);
}

#[test]
fn properties_change_between_chunks() {
    init_logging();
    let first = sample(3000, 1);
    let second = sample(3000, 2);
    let mut encoder = Lzma2Encoder::new(&Lzma2Options::default());
    let mut stream = Vec::new();
    let mut buf = vec![0u8; 1 << 16];

    let progress = encoder.encode_ops(&greedy_ops(&first, 1 << 16), &mut buf).unwrap();
    stream.extend_from_slice(&buf[..progress.written]);
    encoder.set_properties(LzmaProperties::new(0, 0, 0).unwrap());
    // Properties reset the rep distances on both sides
    let progress = encoder.encode_ops(&greedy_ops(&second, 1 << 16), &mut buf).unwrap();
    stream.extend_from_slice(&buf[..progress.written]);
    let progress = encoder.finish(&mut buf).unwrap();
    assert!(progress.is_finished());
    stream.extend_from_slice(&buf[..progress.written]);

    let mut expected = first.clone();
    expected.extend_from_slice(&second);
    let mut decoder = Lzma2Decoder::new(1 << 16);
    let out = decode_stepped(|i, o| decoder.decode(i, o).unwrap(), &stream, &[64], &[64]);
    assert_eq!(out, expected);
    check_with_lzma_rs(&stream, &expected);
}

#[test]
fn end_marker_ignores_trailer() {
    init_logging();
    let mut decoder = Lzma2Decoder::new(4096);
    let mut out = [0u8; 16];
    let progress = decoder.decode(b"\x00trailing garbage", &mut out).unwrap();
    assert_eq!(progress.status, Status::Finished);
    assert_eq!(progress.consumed, 1);
    assert_eq!(progress.written, 0);
    let progress = decoder.decode(b"more", &mut out).unwrap();
    assert_eq!((progress.consumed, progress.written), (0, 0));
    assert!(decoder.is_finished());
}

#[test]
fn malformed_streams() {
    init_logging();
    let mut out = [0u8; 16];

    let mut decoder = Lzma2Decoder::new(4096);
    assert_eq!(
        decoder.decode(b"\x42", &mut out),
        Err(Lzma2Error::InvalidControlByte { control: 0x42 }.into())
    );

    // An LZMA chunk without properties at the start of the stream
    let mut decoder = Lzma2Decoder::new(4096);
    let err = decoder.decode(b"\xA0\x00\x00\x00\x05", &mut out).unwrap_err();
    assert_eq!(err, Unsupported::MissingProperties { control: 0xA0 }.into());
    assert!(err.is_unsupported());

    // A reserved control byte after a valid copy chunk
    let mut decoder = Lzma2Decoder::new(4096);
    let err = decoder.decode(b"\x01\x00\x01ab\x03", &mut out).unwrap_err();
    assert_eq!(err, CodecError::Lzma2(Lzma2Error::InvalidControlByte { control: 0x03 }));
    assert_eq!(decoder.decode(b"\x00", &mut out), Err(err));
}

#[test]
fn dict_size_properties() {
    init_logging();
    assert!(Lzma2Decoder::from_dict_prop(40).is_ok());
    assert_eq!(
        Lzma2Decoder::from_dict_prop(41).unwrap_err(),
        Lzma2Error::InvalidDictionarySizeProperty { property: 41 }.into()
    );
    let options = Lzma2Options {
        dict_size: 1 << 20,
        ..Lzma2Options::default()
    };
    assert_eq!(Lzma2Encoder::new(&options).dict_size_prop(), 18);
}
