//! Wire stream construction helpers

use trice_rs::decoder::{
    wire::pack_params, Endianness, FrameEncoder, FrameFormat, ParamLayout, ParamValue,
};
use trice_rs::{FormatTable, StampWidth, TriceId};

/// Encode one record for `id` of `table`
pub fn frame(
    table: &FormatTable,
    id: u32,
    stamp: StampWidth,
    timestamp: u32,
    values: &[ParamValue],
    format: FrameFormat,
    endianness: Endianness,
) -> Vec<u8> {
    let fmt = table.get(TriceId(id)).expect("id in table");
    let layout = ParamLayout::from_fmt(fmt).expect("decodable macro type");
    let params = pack_params(&layout, values);
    FrameEncoder::new(format, endianness).encode(TriceId(id), stamp, timestamp, &layout, &params)
}

/// Little-endian, type-derived record without stamp
pub fn simple_frame(table: &FormatTable, id: u32, values: &[ParamValue]) -> Vec<u8> {
    frame(
        table,
        id,
        StampWidth::None,
        0,
        values,
        FrameFormat::TypeDerived,
        Endianness::Little,
    )
}
