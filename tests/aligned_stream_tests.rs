//! Aligned stream integration tests
//!
//! Scenario tests pin the logical and physical cursors after every call;
//! property tests drive random operation sequences against a plain `Vec<u8>`
//! model.

use directcopy::device::{Device, MemoryDevice};
use directcopy::stream::{AlignedReader, AlignedWriter, ByteStream, Capabilities, HighWaterMark, IoStream};
use directcopy::{Error, StreamConfig};
use proptest::prelude::*;
use rstest::*;
use std::io::{self, Seek, SeekFrom};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 13 % 251) as u8).collect()
}

/// Asserts logical position, logical length, physical position, physical length.
macro_rules! assert_writer {
    ($stream:expr, $pos:expr, $len:expr, $ppos:expr, $plen:expr) => {{
        assert_eq!($stream.position(), $pos, "logical position");
        assert_eq!($stream.len(), $len, "logical length");
        assert_eq!($stream.physical_position(), $ppos, "physical position");
        assert_eq!($stream.physical_len(), $plen, "physical length");
    }};
}

// ============================================================================
// Writer Scenarios
// ============================================================================

#[test]
fn test_writer_positions_on_write_only_device() {
    let mut device = MemoryDevice::new(512).with_capabilities(Capabilities::new(false, true, true));
    let buffer = [0x5Au8; 1024];
    {
        let mut stream = AlignedWriter::with_alignment(&mut device, 512).unwrap();
        assert!(!stream.can_seek());

        stream.write(&buffer[..500]).unwrap();
        assert_writer!(stream, 500, 500, 0, 0);
        stream.write(&buffer[..524]).unwrap();
        assert_writer!(stream, 1024, 1024, 1024, 1024);
        stream.write(&buffer[..512]).unwrap();
        assert_writer!(stream, 1536, 1536, 1536, 1536);
        stream.write(&buffer[..1000]).unwrap();
        assert_writer!(stream, 2536, 2536, 2048, 2048);

        stream.close().unwrap();
    }
    // The last block goes out padded, nothing can trim it from here.
    assert_eq!(device.position(), 2560);
    assert_eq!(Device::len(&device), 2560);
    assert!(device.contents()[2536..].iter().all(|&b| b == 0));
}

#[test]
fn test_writer_seek_positions() {
    let mut device = MemoryDevice::new(512);
    let buffer = pattern(1024);
    {
        let mut stream = AlignedWriter::with_alignment(&mut device, 512).unwrap();

        stream.write(&buffer[..500]).unwrap();
        assert_writer!(stream, 500, 500, 0, 0);
        stream.seek(SeekFrom::Start(400)).unwrap();
        assert_writer!(stream, 400, 500, 0, 0);
        stream.write(&buffer[..650]).unwrap();
        assert_writer!(stream, 1050, 1050, 1024, 1024);
        stream.seek(SeekFrom::Start(1000)).unwrap();
        assert_writer!(stream, 1000, 1050, 512, 1536);
        stream.write(&buffer[19..43]).unwrap();
        assert_writer!(stream, 1024, 1050, 1024, 1536);
        stream.seek(SeekFrom::Start(12)).unwrap();
        assert_writer!(stream, 12, 1050, 0, 1536);
        stream.write(&buffer[19..519]).unwrap();
        assert_writer!(stream, 512, 1050, 512, 1536);
        stream.seek(SeekFrom::End(-2)).unwrap();
        assert_writer!(stream, 1048, 1050, 1024, 1536);
        stream.write(&buffer[..1000]).unwrap();
        assert_writer!(stream, 2048, 2048, 2048, 2048);
        stream.seek(SeekFrom::Current(-1000)).unwrap();
        assert_writer!(stream, 1048, 2048, 1024, 2048);
        stream.seek(SeekFrom::End(0)).unwrap();
        assert_writer!(stream, 2048, 2048, 2048, 2048);
        stream.write(&buffer[11..13]).unwrap();
        assert_writer!(stream, 2050, 2050, 2048, 2048);
        stream.seek(SeekFrom::Start(4000)).unwrap();
        assert_writer!(stream, 4000, 2050, 3584, 2560);
        stream.write(&buffer[40..135]).unwrap();
        assert_writer!(stream, 4095, 4095, 3584, 2560);
        stream.write(&buffer[40..41]).unwrap();
        assert_writer!(stream, 4096, 4096, 4096, 4096);
    }
    assert_eq!(device.position(), 4096);
    assert_eq!(Device::len(&device), 4096);

    let data = device.contents();
    assert_eq!(&data[..12], &buffer[..12]);
    assert_eq!(&data[12..512], &buffer[19..519]);
    assert_eq!(&data[1000..1024], &buffer[19..43]);
    assert_eq!(&data[2048..2050], &buffer[11..13]);
    assert!(data[2050..4000].iter().all(|&b| b == 0));
    assert_eq!(data[4095], buffer[40]);
}

#[test]
fn test_writer_length_changes() {
    let mut device = MemoryDevice::new(512);
    let buffer = [0x11u8; 1024];
    {
        let mut stream = AlignedWriter::with_alignment(&mut device, 512).unwrap();

        stream.write(&buffer[..1000]).unwrap();
        assert_writer!(stream, 1000, 1000, 512, 512);
        stream.set_len(1024).unwrap();
        assert_writer!(stream, 1000, 1024, 512, 1024);
        stream.set_len(512).unwrap();
        assert_writer!(stream, 512, 512, 512, 512);
        stream.write(&buffer[..1000]).unwrap();
        assert_writer!(stream, 1512, 1512, 1024, 1024);
        stream.set_len(2048).unwrap();
        assert_writer!(stream, 1512, 2048, 1024, 2048);
        stream.write(&buffer[..38]).unwrap();
        assert_writer!(stream, 1550, 2048, 1536, 2048);
        stream.set_len(0).unwrap();
        assert_writer!(stream, 0, 0, 0, 0);
        stream.flush().unwrap();
        assert_writer!(stream, 0, 0, 0, 0);
    }
    assert!(device.contents().is_empty());
}

#[test]
fn test_extension_reads_back_as_zero() {
    let mut device = MemoryDevice::new(16);
    {
        let mut stream = AlignedWriter::with_alignment(&mut device, 16).unwrap();
        stream.write(&[0xFFu8; 40]).unwrap();
        stream.set_len(7).unwrap();
        stream.set_len(70).unwrap();
        assert_eq!(stream.len(), 70);
        stream.close().unwrap();
    }

    device.seek(SeekFrom::Start(0)).unwrap();
    let mut reader = AlignedReader::with_alignment(&mut device, 16).unwrap();
    let mut out = vec![0xAAu8; 70];
    assert_eq!(reader.read(&mut out).unwrap(), 70);
    assert_eq!(&out[..7], &[0xFFu8; 7]);
    assert!(out[7..].iter().all(|&b| b == 0));
}

#[test]
fn test_write_range_validates_bounds() {
    let mut stream = AlignedWriter::with_alignment(MemoryDevice::new(16), 16).unwrap();
    let buf = [1u8; 8];
    assert!(matches!(stream.write_range(&buf, 4, 8), Err(Error::InvalidArgument(_))));
    stream.write_range(&buf, 4, 4).unwrap();
    assert_eq!(stream.position(), 4);
}

#[test]
fn test_writer_rejects_read_only_device() {
    let device = MemoryDevice::new(16).with_capabilities(Capabilities::READ_ONLY);
    assert!(matches!(
        AlignedWriter::with_alignment(device, 16),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_seek_before_start_is_rejected() {
    let mut stream = AlignedWriter::with_alignment(MemoryDevice::new(16), 16).unwrap();
    stream.write(&[1u8; 10]).unwrap();
    assert!(matches!(stream.seek(SeekFrom::Current(-11)), Err(Error::InvalidArgument(_))));
    assert_eq!(stream.position(), 10);
}

#[test]
fn test_closed_writer_refuses_io() {
    let mut stream = AlignedWriter::with_alignment(MemoryDevice::new(16), 16).unwrap();
    stream.write(b"abc").unwrap();
    stream.close().unwrap();
    stream.close().unwrap();
    assert_eq!(stream.capabilities(), Capabilities::NONE);
    assert!(matches!(stream.write(b"d"), Err(Error::NotSupported(_))));
    assert!(stream.flush().is_ok());
}

// ============================================================================
// Reader Scenarios
// ============================================================================

#[fixture]
fn odd_sized_reader() -> AlignedReader<MemoryDevice> {
    AlignedReader::with_alignment(MemoryDevice::with_data(pattern(6000), 512), 512).unwrap()
}

fn assert_reader(stream: &AlignedReader<MemoryDevice>, pos: u64, physical: u64) {
    assert_eq!(stream.position(), pos, "logical position");
    assert_eq!(stream.physical_position(), physical, "physical position");
}

#[rstest]
fn test_reader_seek_positions(mut odd_sized_reader: AlignedReader<MemoryDevice>) {
    let stream = &mut odd_sized_reader;
    let len = stream.len();
    let floor = |x: u64| x - x % 512;

    stream.seek(SeekFrom::Start(12)).unwrap();
    assert_reader(stream, 12, 0);
    stream.seek(SeekFrom::Start(512)).unwrap();
    assert_reader(stream, 512, 512);
    stream.seek(SeekFrom::Start(600)).unwrap();
    assert_reader(stream, 600, 512);
    stream.seek(SeekFrom::Start(4096)).unwrap();
    assert_reader(stream, 4096, 4096);
    stream.seek(SeekFrom::Current(-3000)).unwrap();
    assert_reader(stream, 1096, 1024);
    stream.seek(SeekFrom::Current(1024)).unwrap();
    assert_reader(stream, 2120, 2048);
    stream.seek(SeekFrom::Current(3385)).unwrap();
    assert_reader(stream, 5505, 5120);
    for back in [100u64, 512, 2658] {
        stream.seek(SeekFrom::End(-(back as i64))).unwrap();
        assert_reader(stream, len - back, floor(len - back));
    }
    stream.seek(SeekFrom::Start(0)).unwrap();
    assert_reader(stream, 0, 0);
}

#[rstest]
fn test_reader_read_positions(mut odd_sized_reader: AlignedReader<MemoryDevice>) {
    let stream = &mut odd_sized_reader;
    let len = stream.len();
    let tail = len % 512;
    let source = pattern(6000);
    let mut buffer = vec![0u8; 1000];

    assert_eq!(stream.read(&mut buffer).unwrap(), 1000);
    assert_eq!(buffer, source[..1000]);
    assert_reader(stream, 1000, 1024);
    stream.read(&mut buffer[..4]).unwrap();
    assert_reader(stream, 1004, 1024);
    stream.read(&mut buffer[..21]).unwrap();
    assert_reader(stream, 1025, 1536);
    stream.read(&mut buffer[..1]).unwrap();
    assert_reader(stream, 1026, 1536);
    stream.read(&mut buffer[..510]).unwrap();
    assert_reader(stream, 1536, 1536);
    stream.read(&mut buffer[..24]).unwrap();
    assert_reader(stream, 1560, 2048);
    assert_eq!(stream.read(&mut buffer).unwrap(), 1000);
    assert_eq!(buffer, source[1560..2560]);
    assert_reader(stream, 2560, 2560);

    stream.seek(SeekFrom::End(0)).unwrap();
    assert_reader(stream, len, len - tail);
    assert_eq!(stream.read(&mut buffer).unwrap(), 0);
    assert_reader(stream, len, len);
    assert_eq!(stream.read(&mut buffer).unwrap(), 0);
    assert_reader(stream, len, len);

    stream.seek(SeekFrom::Start(0)).unwrap();
    assert_reader(stream, 0, 0);
    stream.seek(SeekFrom::Start(2)).unwrap();
    assert_reader(stream, 2, 0);
    stream.read(&mut buffer[..10]).unwrap();
    assert_eq!(buffer[..10], source[2..12]);
    assert_reader(stream, 12, 512);
    stream.seek(SeekFrom::Start(500)).unwrap();
    assert_reader(stream, 500, 512);
    stream.read(&mut buffer[..12]).unwrap();
    assert_eq!(buffer[..12], source[500..512]);
    assert_reader(stream, 512, 512);

    stream.seek(SeekFrom::End(-(tail as i64))).unwrap();
    assert_reader(stream, len - tail, len - tail);
    stream.read(&mut buffer[..24]).unwrap();
    assert_reader(stream, len - tail + 24, len);
    stream.seek(SeekFrom::Current(100)).unwrap();
    assert_reader(stream, len - tail + 124, len);
    stream.read(&mut buffer[..100]).unwrap();
    assert_eq!(buffer[..100], source[(len - tail + 124) as usize..(len - tail + 224) as usize]);
    assert_reader(stream, len - tail + 224, len);
    stream.seek(SeekFrom::End(0)).unwrap();
    assert_reader(stream, len, len);
}

#[rstest]
#[case(512, 0)]
#[case(511, 0)]
#[case(513, 0)]
#[case(512, 3)]
#[case(1, 511)]
#[case(1025, 511)]
fn test_read_at_block_boundaries(#[case] count: usize, #[case] start: u64) {
    let source = pattern(3000);
    let mut stream =
        AlignedReader::with_alignment(MemoryDevice::with_data(source.clone(), 512), 512).unwrap();
    stream.seek(SeekFrom::Start(start)).unwrap();

    let mut buf = vec![0u8; count];
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(n, count);
    assert_eq!(buf, source[start as usize..start as usize + count]);
    assert_eq!(stream.position(), start + count as u64);
}

#[rstest]
fn test_reader_read_past_end_returns_nothing(mut odd_sized_reader: AlignedReader<MemoryDevice>) {
    let stream = &mut odd_sized_reader;
    let source = pattern(6000);
    let mut buf = vec![0u8; 100];

    stream.seek(SeekFrom::Start(6100)).unwrap();
    assert_eq!(stream.read(&mut buf).unwrap(), 0);
    assert_eq!(stream.position(), 6100);

    stream.seek(SeekFrom::Start(5990)).unwrap();
    assert_eq!(stream.read(&mut buf).unwrap(), 10);
    assert_eq!(buf[..10], source[5990..]);
    assert_eq!(stream.read(&mut buf).unwrap(), 0);
    assert_eq!(stream.position(), 6000);
}

#[test]
fn test_reader_refuses_writes() {
    let mut stream = AlignedReader::with_alignment(MemoryDevice::new(16), 16).unwrap();
    assert!(!stream.can_write());
    assert!(matches!(stream.write(b"x"), Err(Error::NotSupported(_))));
    assert!(matches!(stream.set_len(0), Err(Error::NotSupported(_))));
}

#[test]
fn test_reader_starts_at_unaligned_device_position() {
    let source = pattern(100);
    let mut device = MemoryDevice::with_data(source.clone(), 1);
    device.seek(SeekFrom::Start(37)).unwrap();

    let mut stream = AlignedReader::with_alignment(&mut device, 16).unwrap();
    assert_eq!(stream.position(), 37);
    assert_eq!(stream.physical_position(), 32);
    let mut buf = [0u8; 20];
    assert_eq!(stream.read(&mut buf).unwrap(), 20);
    assert_eq!(buf[..], source[37..57]);
}

// ============================================================================
// Adapters
// ============================================================================

#[test]
fn test_io_adapters_copy_through_std() {
    let source = pattern(5000);
    let reader =
        AlignedReader::with_alignment(MemoryDevice::with_data(source.clone(), 512), 512).unwrap();
    let mut target = MemoryDevice::new(512);
    {
        let writer = AlignedWriter::with_alignment(&mut target, 512).unwrap();
        let mut input = IoStream(reader);
        let mut output = IoStream(HighWaterMark::new(writer));

        let copied = io::copy(&mut input, &mut output).unwrap();
        assert_eq!(copied, 5000);
        assert_eq!(output.0.high_water_mark(), 5000);
        output.0.close().unwrap();
    }
    assert_eq!(&target.contents()[..5000], &source[..]);
    assert!(target.contents()[5000..].iter().all(|&b| b == 0));
}

#[test]
fn test_high_water_mark_survives_seek_back() {
    let writer = AlignedWriter::new(MemoryDevice::new(16), StreamConfig::new(16)).unwrap();
    let mut stream = HighWaterMark::new(writer);
    stream.write(&[1u8; 50]).unwrap();
    stream.seek(SeekFrom::Start(3)).unwrap();
    stream.write(&[2u8; 4]).unwrap();
    assert_eq!(stream.position(), 7);
    assert_eq!(stream.high_water_mark(), 50);
}

// ============================================================================
// Property Tests
// ============================================================================

#[derive(Debug, Clone)]
enum WriterOp {
    Write { len: usize, fill: u8 },
    Seek { target: u64, origin: u8 },
    SetLen(u64),
    Flush,
}

fn interesting_len(alignment: usize) -> impl Strategy<Value = usize> {
    prop_oneof![
        Just(alignment),
        Just(alignment.saturating_sub(1)),
        Just(alignment + 1),
        Just(2 * alignment + 1),
        0..3 * alignment + 2,
    ]
}

fn writer_op(alignment: usize, bound: u64) -> impl Strategy<Value = WriterOp> {
    prop_oneof![
        4 => (interesting_len(alignment), any::<u8>())
            .prop_map(|(len, fill)| WriterOp::Write { len, fill }),
        3 => (0..bound, 0u8..3).prop_map(|(target, origin)| WriterOp::Seek { target, origin }),
        2 => (0..bound).prop_map(WriterOp::SetLen),
        1 => Just(WriterOp::Flush),
    ]
}

/// Expresses an absolute target as a seek from the given origin.
fn seek_from(target: u64, origin: u8, position: u64, len: u64) -> SeekFrom {
    match origin {
        0 => SeekFrom::Start(target),
        1 => SeekFrom::Current(target as i64 - position as i64),
        _ => SeekFrom::End(target as i64 - len as i64),
    }
}

fn writer_case() -> impl Strategy<Value = (usize, Vec<WriterOp>)> {
    prop_oneof![Just(1usize), Just(3), Just(4), Just(16), Just(512)].prop_flat_map(|alignment| {
        let bound = (alignment as u64 * 6).max(64);
        (
            Just(alignment),
            prop::collection::vec(writer_op(alignment, bound), 1..40),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_writer_matches_model((alignment, ops) in writer_case()) {
        let mut device = MemoryDevice::new(alignment);
        let mut model: Vec<u8> = Vec::new();
        let mut pos = 0u64;
        {
            let mut stream = AlignedWriter::with_alignment(&mut device, alignment).unwrap();
            for op in &ops {
                match *op {
                    WriterOp::Write { len: 0, .. } => {
                        stream.write(&[]).unwrap();
                    }
                    WriterOp::Write { len, fill } => {
                        let data = vec![fill; len];
                        stream.write(&data).unwrap();
                        let start = pos as usize;
                        if model.len() < start + len {
                            model.resize(start + len, 0);
                        }
                        model[start..start + len].copy_from_slice(&data);
                        pos += len as u64;
                    }
                    WriterOp::Seek { target, origin } => {
                        let from = seek_from(target, origin, pos, model.len() as u64);
                        prop_assert_eq!(stream.seek(from).unwrap(), target);
                        pos = target;
                    }
                    WriterOp::SetLen(len) => {
                        stream.set_len(len).unwrap();
                        model.resize(len as usize, 0);
                        pos = pos.min(len);
                    }
                    WriterOp::Flush => stream.flush().unwrap(),
                }
                prop_assert_eq!(stream.position(), pos, "position after {:?}", op);
                prop_assert_eq!(stream.len(), model.len() as u64, "length after {:?}", op);
                prop_assert_eq!(stream.physical_position() % alignment as u64, 0);
            }
            stream.close().unwrap();
        }

        let data = device.contents();
        prop_assert!(data.len() >= model.len());
        prop_assert_eq!(&data[..model.len()], &model[..]);
        prop_assert!(data[model.len()..].iter().all(|&b| b == 0));
    }
}

#[derive(Debug, Clone)]
enum ReaderOp {
    Read(usize),
    Seek { target: u64, origin: u8 },
}

fn reader_case() -> impl Strategy<Value = (usize, Vec<u8>, Vec<ReaderOp>)> {
    (prop_oneof![Just(1usize), Just(3), Just(4), Just(16), Just(512)], 0usize..3000).prop_flat_map(
        |(alignment, len)| {
            let bound = len as u64 + 2 * alignment as u64;
            let op = prop_oneof![
                3 => interesting_len(alignment).prop_map(ReaderOp::Read),
                1 => (0usize..2000).prop_map(ReaderOp::Read),
                3 => (0..bound, 0u8..3).prop_map(|(target, origin)| ReaderOp::Seek { target, origin }),
            ];
            (
                Just(alignment),
                prop::collection::vec(any::<u8>(), len),
                prop::collection::vec(op, 1..40),
            )
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_reader_matches_model((alignment, source, ops) in reader_case()) {
        let device = MemoryDevice::with_data(source.clone(), alignment);
        let mut stream = AlignedReader::with_alignment(device, alignment).unwrap();
        let len = source.len() as u64;
        let mut pos = 0u64;

        for op in &ops {
            match *op {
                ReaderOp::Read(count) => {
                    let mut buf = vec![0u8; count];
                    let n = stream.read(&mut buf).unwrap();
                    let expected = if pos >= len { 0 } else { count.min((len - pos) as usize) };
                    prop_assert_eq!(n, expected);
                    if n > 0 {
                        prop_assert_eq!(&buf[..n], &source[pos as usize..pos as usize + n]);
                    }
                    pos += n as u64;
                }
                ReaderOp::Seek { target, origin } => {
                    prop_assert_eq!(stream.seek(seek_from(target, origin, pos, len)).unwrap(), target);
                    pos = target;
                }
            }
            prop_assert_eq!(stream.position(), pos, "position after {:?}", op);
            prop_assert_eq!(stream.len(), len);
        }
    }
}
