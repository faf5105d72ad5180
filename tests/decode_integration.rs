//! Integration tests for the run-time path: framing, rendering, line
//! composition and the threaded pipeline

mod common;

use common::streams::{frame, simple_frame};
use common::table;
use proptest::prelude::*;
use std::io::Cursor;
use trice_rs::decoder::{
    wire::pack_params, Decoder, Endianness, FrameFormat, FramerConfig, ParamLayout, ParamValue,
    StreamFramer, Xtea,
};
use trice_rs::emitter::{CollectingSink, LineComposer, TimestampFormat};
use trice_rs::pipeline::{DecodePipeline, PipelineOptions};
use trice_rs::{FormatTable, StampWidth, TriceId};

fn render_table() -> FormatTable {
    table(&[
        (1, "TRICE32_1", "%u"),
        (2, "TRICE64_1", "%O"),
        (3, "TRICE_S", "%x"),
        (4, "TRICE32", "%e %f"),
        (5, "TRICE8_2", "%d %b"),
        (6, "TRICE16", "%5d|%-5x|%c\\n"),
    ])
}

fn decode_all(table: FormatTable, bytes: &[u8]) -> Vec<String> {
    let mut decoder = Decoder::new(table, FramerConfig::default());
    decoder.push(bytes);
    std::iter::from_fn(|| decoder.next_decoded())
        .map(|r| r.unwrap().text)
        .collect()
}

#[test]
fn test_rendering_through_the_wire() {
    let t = render_table();
    let mut bytes = Vec::new();
    bytes.extend(simple_frame(&t, 1, &[ParamValue::Int(-1)]));
    bytes.extend(simple_frame(&t, 2, &[ParamValue::Int(-1)]));
    bytes.extend(simple_frame(&t, 3, &[ParamValue::Str("café".into())]));
    bytes.extend(simple_frame(
        &t,
        4,
        &[ParamValue::Float(-555555555.5), ParamValue::Float(0.25)],
    ));
    bytes.extend(simple_frame(&t, 5, &[ParamValue::Int(-3), ParamValue::Int(5)]));
    bytes.extend(simple_frame(
        &t,
        6,
        &[ParamValue::Int(42), ParamValue::Int(255), ParamValue::Int(65)],
    ));

    assert_eq!(
        decode_all(t, &bytes),
        vec![
            "4294967295",
            "0o1777777777777777777777",
            "636166c3a9",
            "-5.555556e+08 0.250000",
            "-3 101",
            "   42|ff   |A\\n",
        ]
    );
}

#[test]
fn test_count_mismatch_is_flagged() {
    let t = table(&[(9, "TRICE8_2", "only %d")]);
    let bytes = simple_frame(&t, 9, &[ParamValue::Int(1), ParamValue::Int(2)]);
    let mut decoder = Decoder::new(t, FramerConfig::default());
    decoder.push(&bytes);
    let decoded = decoder.next_decoded().unwrap().unwrap();
    assert!(decoded.mismatch.is_some());
    assert!(decoded.text.starts_with("only 1"));
    assert!(decoded.text.contains("%!(EXTRA"));
}

#[test]
fn test_pipeline_big_endian_explicit_length() {
    let t = table(&[
        (1000, "TRICE16_1", "adc=%u "),
        (1001, "TRICE32_1", "temp=%d\\n"),
        (70000, "TRICE_S", "msg:%s\\n"),
    ]);
    let enc = |id, stamp, ts, values: &[ParamValue]| {
        frame(
            &t,
            id,
            stamp,
            ts,
            values,
            FrameFormat::ExplicitLength,
            Endianness::Big,
        )
    };
    let mut stream = Vec::new();
    stream.extend(enc(1000, StampWidth::Bits16, 0x1616, &[ParamValue::Int(512)]));
    stream.extend(enc(1001, StampWidth::Bits32, 7, &[ParamValue::Int(-40)]));
    stream.extend([0xEB, 0x03, 0x00]);
    stream.extend(enc(70000, StampWidth::None, 0, &[ParamValue::Str("boot".into())]));
    stream.extend(enc(1000, StampWidth::Bits16, 1, &[ParamValue::Int(3)]));

    let sink = CollectingSink::new();
    let composer = LineComposer::new(sink.clone(), TimestampFormat::Zero, "dev:", "");
    let config = FramerConfig {
        format: FrameFormat::ExplicitLength,
        endianness: Endianness::Big,
        cipher: None,
    };
    let options = PipelineOptions {
        channel_capacity: 2,
        chunk_size: 5,
        target_stamp: true,
    };

    let stats = DecodePipeline::new(options)
        .run(Cursor::new(stream), Decoder::new(t.clone(), config), composer)
        .unwrap();

    let lines: Vec<String> = sink.lines().iter().map(|l| l.to_string()).collect();
    assert_eq!(
        lines,
        vec![
            "2006-01-02_1504-05 dev: time:    1616adc=512 temp=-40",
            "2006-01-02_1504-05 dev: time:        msg:boot",
            "2006-01-02_1504-05 dev: time:       1adc=3 ",
        ]
    );
    assert_eq!(stats.records, 4);
    assert_eq!(stats.framing_errors, 1);
    assert_eq!(stats.lines, 3);
}

#[test]
fn test_pipeline_with_encryption_and_wrong_key() {
    let t = table(&[(7, "TRICE8_1", "v=%d\\n")]);
    let mut stream = Vec::new();
    for v in 0..4 {
        stream.extend(simple_frame(&t, 7, &[ParamValue::Int(v)]));
    }
    stream.truncate(stream.len() / 8 * 8);
    Xtea::from_passphrase("MySecret").unwrap().encrypt(&mut stream);

    let run = |password: &str| {
        let sink = CollectingSink::new();
        let composer = LineComposer::new(sink.clone(), TimestampFormat::Off, "", "");
        let config = FramerConfig {
            cipher: Xtea::from_passphrase(password),
            ..FramerConfig::default()
        };
        DecodePipeline::new(PipelineOptions::default())
            .run(Cursor::new(stream.clone()), Decoder::new(t.clone(), config), composer)
            .unwrap();
        sink.bodies()
    };

    // Frames are 5 bytes, so 4 frames leave 16 bytes after truncation
    assert_eq!(run("MySecret"), vec!["v=0", "v=1", "v=2"]);
    assert!(!run("WrongKey").contains(&"v=0".to_string()));
}

// ==================== Properties ====================

fn roundtrip_table() -> FormatTable {
    table(&[
        (1, "TRICE8_2", "%d %d"),
        (2, "TRICE16_1", "%u"),
        (3, "TRICE32_1", "%x"),
        (4, "TRICE64_1", "%d"),
        (5, "TRICE_S", "%s"),
        (70000, "TRICE", "wide"),
    ])
}

#[derive(Debug, Clone)]
struct Rec {
    id: u32,
    stamp: StampWidth,
    timestamp: u32,
    values: Vec<ParamValue>,
}

fn record_strategy() -> impl Strategy<Value = Rec> {
    let stamp = prop_oneof![
        Just((StampWidth::None, 0u32)),
        any::<u16>().prop_map(|t| (StampWidth::Bits16, u32::from(t))),
        any::<u32>().prop_map(|t| (StampWidth::Bits32, t)),
    ];
    let body = prop_oneof![
        (any::<i8>(), any::<i8>()).prop_map(|(a, b)| {
            (1u32, vec![ParamValue::Int(a.into()), ParamValue::Int(b.into())])
        }),
        any::<u16>().prop_map(|v| (2u32, vec![ParamValue::Int(v.into())])),
        any::<u32>().prop_map(|v| (3u32, vec![ParamValue::Int(v.into())])),
        any::<i64>().prop_map(|v| (4u32, vec![ParamValue::Int(v)])),
        "[a-z0-9 ]{0,40}".prop_map(|s| (5u32, vec![ParamValue::Str(s)])),
        Just((70000u32, Vec::new())),
    ];
    (stamp, body).prop_map(|((stamp, timestamp), (id, values))| Rec {
        id,
        stamp,
        timestamp,
        values,
    })
}

fn wire_strategy() -> impl Strategy<Value = (FrameFormat, Endianness)> {
    (
        prop_oneof![Just(FrameFormat::TypeDerived), Just(FrameFormat::ExplicitLength)],
        prop_oneof![Just(Endianness::Little), Just(Endianness::Big)],
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_framing_roundtrip(
        recs in prop::collection::vec(record_strategy(), 0..20),
        (format, endianness) in wire_strategy(),
        chunk in 1usize..17,
    ) {
        let t = roundtrip_table();
        let mut stream = Vec::new();
        for r in &recs {
            stream.extend(frame(&t, r.id, r.stamp, r.timestamp, &r.values, format, endianness));
        }

        let config = FramerConfig { format, endianness, cipher: None };
        let mut framer = StreamFramer::new(&t, config);
        let mut out = Vec::new();
        for piece in stream.chunks(chunk) {
            framer.push(piece);
            while let Some(record) = framer.next_record() {
                out.push(record.unwrap());
            }
        }

        prop_assert_eq!(out.len(), recs.len());
        for (got, want) in out.iter().zip(&recs) {
            let layout = ParamLayout::from_fmt(t.get(TriceId(want.id)).unwrap()).unwrap();
            prop_assert_eq!(got.id, TriceId(want.id));
            prop_assert_eq!(got.stamp, want.stamp);
            prop_assert_eq!(got.timestamp, want.timestamp);
            prop_assert_eq!(&got.params, &pack_params(&layout, &want.values));
        }
        prop_assert_eq!(framer.stats().framing_errors, 0);
    }

    #[test]
    fn prop_composer_splits_at_newlines(fragments in prop::collection::vec("[a-z \n]{0,8}", 0..30)) {
        let sink = CollectingSink::new();
        let mut composer = LineComposer::new(sink.clone(), TimestampFormat::Off, "", "");
        for f in &fragments {
            composer.write(f).unwrap();
        }
        composer.flush().unwrap();

        let joined: String = fragments.concat();
        let mut expected: Vec<String> = joined.split('\n').map(str::to_string).collect();
        if expected.last().is_some_and(|l| l.is_empty()) {
            expected.pop();
        }
        prop_assert_eq!(sink.bodies(), expected);
    }
}
