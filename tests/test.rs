use std::io::{self, Read, Write};

use assert_matches::assert_matches;
use odb_sdk::reader::{FrameReader, OdbReader};
use odb_sdk::{
    BitField, BitfieldDef, Cell, CodecTag, Column, ColumnKind, Endian, Error, OdbWriter, Result,
    Schema, INTEGER_MISSING, REAL_MISSING,
};

fn read_rows<R: Read>(frame: &mut FrameReader<R>) -> Result<Vec<Vec<Cell>>> {
    let mut rows = Vec::new();
    let mut buf = vec![Cell::ZERO; frame.schema().width()];
    while frame.next_row(&mut buf)? {
        rows.push(buf.clone());
    }
    Ok(rows)
}

fn one_frame(bytes: Vec<u8>) -> Result<FrameReader<io::Cursor<Vec<u8>>>> {
    let frame = FrameReader::open(io::Cursor::new(bytes))?;
    Ok(frame.expect("stream should hold a frame"))
}

#[test]
fn single_double_column() -> Result<()> {
    let schema = Schema::new(vec![Column::new("x", ColumnKind::Double, 1e30)?]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 100)?;
    writer.write_row(&[Cell::from_f64(3.14)])?;
    let bytes = writer.close()?;

    let mut frame = one_frame(bytes)?;
    assert_eq!(frame.codec_tag(0), Some(CodecTag::LongReal));
    assert_eq!(frame.row_count(), 1);

    let before_body = frame.bytes_consumed();
    let rows = read_rows(&mut frame)?;
    assert_eq!(frame.bytes_consumed() - before_body, 8);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0].to_f64(), 3.14);
    Ok(())
}

#[test]
fn narrowed_integers() -> Result<()> {
    let schema = Schema::new(vec![Column::new("n", ColumnKind::Integer, INTEGER_MISSING)?]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 100)?;
    writer.write_row(&[Cell::from_i64(10)])?;
    writer.write_row(&[Cell::from_i64(20)])?;
    let bytes = writer.close()?;

    let mut frame = one_frame(bytes)?;
    assert_eq!(frame.codec_tag(0), Some(CodecTag::Int8));

    let before_body = frame.bytes_consumed();
    let rows = read_rows(&mut frame)?;
    assert_eq!(frame.bytes_consumed() - before_body, 2);
    let values: Vec<i64> = rows.iter().map(|r| r[0].to_i64()).collect();
    assert_eq!(values, [10, 20]);
    Ok(())
}

#[test]
fn range_escalates_past_one_byte() -> Result<()> {
    let schema = Schema::new(vec![Column::new("n", ColumnKind::Integer, INTEGER_MISSING)?]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 100)?;
    writer.write_row(&[Cell::from_i64(0)])?;
    writer.write_row(&[Cell::from_i64(256)])?;
    let bytes = writer.close()?;

    let frame = one_frame(bytes)?;
    assert_eq!(frame.codec_tag(0), Some(CodecTag::Int16));
    Ok(())
}

#[test]
fn constant_string_column() -> Result<()> {
    let schema = Schema::new(vec![Column::new("k", ColumnKind::String, 0.0)?]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 100)?;
    for _ in 0..3 {
        writer.write_row(&[Cell::from_str("ABC")?])?;
    }
    let bytes = writer.close()?;

    let mut frame = one_frame(bytes)?;
    assert_eq!(frame.codec_tag(0), Some(CodecTag::ConstantString));

    let before_body = frame.bytes_consumed();
    let rows = read_rows(&mut frame)?;
    assert_eq!(frame.bytes_consumed(), before_body, "constant body is empty");
    assert_eq!(rows.len(), 3);
    for row in rows {
        assert_eq!(row[0].to_inline_string(), "ABC");
    }
    Ok(())
}

#[test]
fn interned_strings() -> Result<()> {
    let texts = ["alpha", "beta", "alpha", "gamma", "beta"];
    let schema = Schema::new(vec![Column::new("s", ColumnKind::String, 0.0)?]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 100)?;
    for text in texts {
        writer.write_row(&[Cell::from_str(text)?])?;
    }
    let bytes = writer.close()?;

    let mut frame = one_frame(bytes)?;
    assert_eq!(frame.codec_tag(0), Some(CodecTag::IntString));
    assert_eq!(frame.dictionary(0).unwrap(), ["alpha", "beta", "gamma"]);

    // Ids are narrow enough for one byte each.
    let before_body = frame.bytes_consumed();
    let rows = read_rows(&mut frame)?;
    assert_eq!(frame.bytes_consumed() - before_body, texts.len() as u64);

    let decoded: Vec<String> = rows.iter().map(|r| r[0].to_inline_string()).collect();
    assert_eq!(decoded, texts);
    Ok(())
}

#[test]
fn long_strings_travel_through_the_dictionary() -> Result<()> {
    let schema = Schema::new(vec![Column::new("station", ColumnKind::String, 0.0)?]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 100)?;
    for name in ["payerne-mohp", "lindenberg", "payerne-mohp", "ny-alesund"] {
        writer.write_row_with_strings(&[Cell::ZERO], &[Some(name)])?;
    }
    let bytes = writer.close()?;

    let mut frame = one_frame(bytes)?;
    assert_eq!(frame.codec_tag(0), Some(CodecTag::IntString));
    assert_eq!(
        frame.dictionary(0).unwrap(),
        ["payerne-mohp", "lindenberg", "ny-alesund"]
    );

    let rows = read_rows(&mut frame)?;
    // The slot keeps the eight-byte prefix; the dictionary has the rest.
    assert_eq!(rows[0][0].to_inline_string(), "payerne-");
    assert_eq!(rows[1][0].to_inline_string(), "lindenbe");
    assert_eq!(rows[3][0].to_inline_string(), "ny-alesu");
    Ok(())
}

#[test]
fn constant_long_strings_live_in_the_header() -> Result<()> {
    let schema = Schema::new(vec![Column::new("station", ColumnKind::String, 0.0)?]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 100)?;
    for _ in 0..2 {
        writer.write_row_with_strings(&[Cell::ZERO], &[Some("jokioinen-radar")])?;
    }
    let bytes = writer.close()?;

    let mut frame = one_frame(bytes)?;
    assert_eq!(frame.codec_tag(0), Some(CodecTag::ConstantString));
    let rows = read_rows(&mut frame)?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0].to_inline_string(), "jokioine");
    Ok(())
}

#[test]
fn side_channel_entries_are_validated() -> Result<()> {
    let schema = Schema::new(vec![
        Column::new("n", ColumnKind::Integer, INTEGER_MISSING)?,
        Column::new("s", ColumnKind::String, 0.0)?,
    ]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 100)?;

    assert_matches!(
        writer.write_row_with_strings(&[Cell::ZERO, Cell::ZERO], &[Some("x")]),
        Err(Error::FormatViolation(_))
    );
    assert_matches!(
        writer.write_row_with_strings(&[Cell::ZERO, Cell::ZERO], &[Some("x"), None]),
        Err(Error::FormatViolation(_))
    );

    writer.write_row_with_strings(
        &[Cell::from_i64(1), Cell::ZERO],
        &[None, Some("helsinki-vantaa")],
    )?;
    writer.write_row(&[Cell::from_i64(2), Cell::from_str("short")?])?;
    let bytes = writer.close()?;

    let mut frame = one_frame(bytes)?;
    let rows = read_rows(&mut frame)?;
    assert_eq!(rows[0][1].to_inline_string(), "helsinki");
    assert_eq!(rows[1][1].to_inline_string(), "short");
    Ok(())
}

#[test]
fn missing_integers_ride_the_sentinel() -> Result<()> {
    let schema = Schema::new(vec![Column::new("q", ColumnKind::Integer, -1.0)?]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 100)?;
    for v in [5, -1, 7] {
        writer.write_row(&[Cell::from_i64(v)])?;
    }
    let bytes = writer.close()?;

    let mut frame = one_frame(bytes)?;
    assert_eq!(frame.codec_tag(0), Some(CodecTag::Int8Missing));

    let rows = read_rows(&mut frame)?;
    let values: Vec<i64> = rows.iter().map(|r| r[0].to_i64()).collect();
    assert_eq!(values, [5, -1, 7]);
    Ok(())
}

fn all_kinds_schema() -> Result<Schema> {
    let def = BitfieldDef::new(vec![
        BitField::new("active", 1),
        BitField::new("level", 4),
    ])?;
    Ok(Schema::new(vec![
        Column::new("skip", ColumnKind::Ignore, 0.0)?,
        Column::new("count", ColumnKind::Integer, INTEGER_MISSING)?,
        Column::new("temp", ColumnKind::Real, REAL_MISSING)?,
        Column::new("site", ColumnKind::String, 0.0)?,
        Column::bitfield_column("flags", INTEGER_MISSING, def)?,
        Column::new("value", ColumnKind::Double, REAL_MISSING)?,
    ]))
}

fn all_kinds_rows() -> Result<Vec<Vec<Cell>>> {
    let mut rows = Vec::new();
    for (i, site) in ["ams", "oslo", "ams"].iter().enumerate() {
        rows.push(vec![
            Cell::from_i64(i as i64),
            Cell::from_i64(100000 + 37 * i as i64),
            Cell::from_f32(1.5 * (i as f32) - 2.25),
            Cell::from_str(site)?,
            Cell::from_i64(0b1_0000 | i as i64),
            Cell::from_f64(3.141592653589793 * (i as f64 + 1.0)),
        ]);
    }
    Ok(rows)
}

fn write_all_kinds(endian: Endian) -> Result<Vec<u8>> {
    let mut writer = OdbWriter::with_byte_order(Vec::new(), endian);
    writer.begin(all_kinds_schema()?, 100)?;
    for row in all_kinds_rows()? {
        writer.write_row(&row)?;
    }
    Ok(writer.close()?)
}

#[test]
fn either_byte_order_restores_the_same_bits() -> Result<()> {
    let expected = all_kinds_rows()?;

    let little = write_all_kinds(Endian::Little)?;
    let big = write_all_kinds(Endian::Big)?;
    assert_ne!(little, big, "orders must differ on the wire");

    let mut frame = one_frame(little)?;
    assert!(matches!(frame.byte_order(), Endian::Little));
    assert_eq!(read_rows(&mut frame)?, expected);

    let mut frame = one_frame(big)?;
    assert!(matches!(frame.byte_order(), Endian::Big));
    assert_eq!(read_rows(&mut frame)?, expected);
    Ok(())
}

#[test]
fn bitfields_unpack_least_significant_first() -> Result<()> {
    let bytes = write_all_kinds(Endian::Little)?;
    let mut frame = one_frame(bytes)?;
    let schema = frame.schema().clone();
    let flags = schema.position("flags").unwrap();
    let def = schema.columns()[flags].bitfield().clone().unwrap();

    let rows = read_rows(&mut frame)?;
    assert_eq!(def.extract(rows[1][flags], "active"), Some(1));
    assert_eq!(def.extract(rows[1][flags], "level"), Some(0b1000));
    Ok(())
}

#[test]
fn empty_frames_read_back_as_empty_iteration() -> Result<()> {
    let schema = Schema::new(vec![Column::new("x", ColumnKind::Double, REAL_MISSING)?]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 100)?;
    writer.flush_frame()?;
    let bytes = writer.close()?;

    let mut reader = OdbReader::new(io::Cursor::new(bytes));
    assert!(reader.next_frame()?);
    assert_eq!(reader.frame().unwrap().row_count(), 0);
    let mut buf = vec![Cell::ZERO; 1];
    assert!(!reader.next_row(&mut buf)?);
    assert!(!reader.next_frame()?);
    Ok(())
}

#[test]
fn streams_flag_schema_changes_and_back_links() -> Result<()> {
    let first = Schema::new(vec![Column::new("a", ColumnKind::Integer, INTEGER_MISSING)?]);
    let second = Schema::new(vec![
        Column::new("a", ColumnKind::Integer, INTEGER_MISSING)?,
        Column::new("b", ColumnKind::Double, REAL_MISSING)?,
    ]);

    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(first.clone(), 100)?;
    writer.write_row(&[Cell::from_i64(1)])?;
    writer.write_row(&[Cell::from_i64(2)])?;
    writer.flush_frame()?;
    writer.write_row(&[Cell::from_i64(3)])?;
    // Changing the schema forces the frame boundary itself.
    writer.begin(second.clone(), 100)?;
    writer.write_row(&[Cell::from_i64(4), Cell::from_f64(0.5)])?;
    let bytes = writer.close()?;

    let mut reader = OdbReader::new(io::Cursor::new(bytes));

    assert!(reader.next_frame()?);
    assert!(reader.schema_changed(), "first frame always re-binds");
    assert_eq!(reader.schema(), Some(&first));
    assert_eq!(reader.frame().unwrap().previous_frame_offset(), -1);

    assert!(reader.next_frame()?);
    assert!(!reader.schema_changed());
    assert_eq!(reader.frame().unwrap().previous_frame_offset(), 0);

    assert!(reader.next_frame()?);
    assert!(reader.schema_changed());
    assert_eq!(reader.schema(), Some(&second));
    assert!(reader.frame().unwrap().previous_frame_offset() > 0);

    let mut buf = vec![Cell::ZERO; 2];
    assert!(reader.next_row(&mut buf)?);
    assert_eq!(buf[0].to_i64(), 4);
    assert!(!reader.next_frame()?);
    Ok(())
}

#[test]
fn full_batches_seal_automatically() -> Result<()> {
    let schema = Schema::new(vec![Column::new("n", ColumnKind::Integer, INTEGER_MISSING)?]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 2)?;
    for v in 0..5 {
        writer.write_row(&[Cell::from_i64(v)])?;
    }
    let bytes = writer.close()?;

    let mut reader = OdbReader::new(io::Cursor::new(bytes));
    let mut frames = 0;
    let mut values = Vec::new();
    while reader.next_frame()? {
        frames += 1;
        let mut buf = vec![Cell::ZERO; 1];
        while reader.next_row(&mut buf)? {
            values.push(buf[0].to_i64());
        }
    }
    assert_eq!(frames, 3);
    assert_eq!(values, [0, 1, 2, 3, 4]);
    Ok(())
}

#[test]
fn rows_must_match_the_schema() -> Result<()> {
    let schema = Schema::new(vec![
        Column::new("a", ColumnKind::Integer, INTEGER_MISSING)?,
        Column::new("b", ColumnKind::Integer, INTEGER_MISSING)?,
    ]);
    let mut writer = OdbWriter::new(Vec::new());

    assert_matches!(
        writer.write_row(&[Cell::ZERO]),
        Err(Error::FormatViolation(_))
    );

    writer.begin(schema, 100)?;
    assert_matches!(
        writer.write_row(&[Cell::ZERO]),
        Err(Error::SchemaMismatch {
            expected: 2,
            actual: 1
        })
    );
    Ok(())
}

#[test]
fn corrupt_magic_fails_fast() -> Result<()> {
    let schema = Schema::new(vec![Column::new("x", ColumnKind::Double, REAL_MISSING)?]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 100)?;
    writer.write_row(&[Cell::from_f64(1.0)])?;
    let mut bytes = writer.close()?;
    bytes[2] = b'X';

    assert_matches!(
        FrameReader::open(io::Cursor::new(bytes)),
        Err(Error::BadMagic)
    );
    Ok(())
}

#[test]
fn truncated_frames_are_truncation_errors() -> Result<()> {
    let schema = Schema::new(vec![Column::new("x", ColumnKind::Double, REAL_MISSING)?]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 100)?;
    writer.write_row(&[Cell::from_f64(1.0)])?;
    writer.write_row(&[Cell::from_f64(2.0)])?;
    let bytes = writer.close()?;

    let truncated = bytes[..bytes.len() - 4].to_vec();
    let mut frame = one_frame(truncated)?;
    let mut buf = vec![Cell::ZERO; 1];
    assert!(frame.next_row(&mut buf)?);
    assert_matches!(frame.next_row(&mut buf), Err(Error::UnexpectedEndOfFrame));
    Ok(())
}

struct FailingSink {
    remaining: usize,
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink gave out"));
        }
        let n = self.remaining.min(buf.len());
        self.remaining -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn a_failed_frame_poisons_the_writer() -> Result<()> {
    let schema = Schema::new(vec![Column::new("x", ColumnKind::Double, REAL_MISSING)?]);
    let mut writer = OdbWriter::new(FailingSink { remaining: 4 });
    writer.begin(schema, 100)?;
    writer.write_row(&[Cell::from_f64(1.0)])?;
    assert_matches!(writer.flush_frame(), Err(Error::IoFailed(_)));

    // All later writes keep reporting the poisoned sink.
    assert_matches!(
        writer.write_row(&[Cell::from_f64(2.0)]),
        Err(Error::IoFailed(_))
    );
    assert_matches!(writer.flush_frame(), Err(Error::IoFailed(_)));
    Ok(())
}

#[test]
fn skipped_frames_still_line_up() -> Result<()> {
    let schema = Schema::new(vec![
        Column::new("s", ColumnKind::String, 0.0)?,
        Column::new("v", ColumnKind::Integer, INTEGER_MISSING)?,
    ]);
    let mut writer = OdbWriter::new(Vec::new());
    writer.begin(schema, 2)?;
    for (i, site) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        writer.write_row(&[Cell::from_str(site)?, Cell::from_i64(i as i64)])?;
    }
    let bytes = writer.close()?;

    // Touch no rows at all; the stream reader must still find every frame.
    let mut reader = OdbReader::new(io::Cursor::new(bytes));
    let mut frames = 0;
    while reader.next_frame()? {
        frames += 1;
    }
    assert_eq!(frames, 3);
    Ok(())
}
