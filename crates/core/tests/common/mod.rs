//! Fixture helpers shared by the integration tests: minimal JPEG files
//! carrying a hand-assembled little-endian EXIF segment.

/// A JPEG whose EXIF block holds `DateTimeOriginal`. The argument must be
/// in EXIF form, e.g. `2023:07:15 14:30:45`.
pub fn jpeg_with_capture_date(datetime: &str) -> Vec<u8> {
    assert_eq!(datetime.len(), 19, "EXIF datetime is exactly 19 chars");

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes()); // IFD0 offset

    // IFD0: one entry pointing at the Exif IFD.
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&ifd_entry(0x8769, 4, 1, 26));
    tiff.extend_from_slice(&0u32.to_le_bytes());

    // Exif IFD at 26: DateTimeOriginal, 20 ASCII bytes stored at 44.
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&ifd_entry(0x9003, 2, 20, 44));
    tiff.extend_from_slice(&0u32.to_le_bytes());

    tiff.extend_from_slice(datetime.as_bytes());
    tiff.push(0);
    assert_eq!(tiff.len(), 64);

    wrap_jpeg(&tiff)
}

/// A JPEG with `DateTimeOriginal` plus a GPS fix. Coordinates are given as
/// whole degrees/minutes/seconds with a hemisphere reference letter.
pub fn jpeg_with_capture_and_gps(
    datetime: &str,
    lat: (u32, u32, u32),
    lat_ref: char,
    lon: (u32, u32, u32),
    lon_ref: char,
) -> Vec<u8> {
    assert_eq!(datetime.len(), 19, "EXIF datetime is exactly 19 chars");

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());

    // IFD0: Exif IFD pointer + GPS IFD pointer.
    tiff.extend_from_slice(&2u16.to_le_bytes());
    tiff.extend_from_slice(&ifd_entry(0x8769, 4, 1, 38));
    tiff.extend_from_slice(&ifd_entry(0x8825, 4, 1, 76));
    tiff.extend_from_slice(&0u32.to_le_bytes());
    assert_eq!(tiff.len(), 38);

    // Exif IFD at 38.
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&ifd_entry(0x9003, 2, 20, 56));
    tiff.extend_from_slice(&0u32.to_le_bytes());
    tiff.extend_from_slice(datetime.as_bytes());
    tiff.push(0);
    assert_eq!(tiff.len(), 76);

    // GPS IFD at 76: refs inline, coordinates as rational triples.
    tiff.extend_from_slice(&4u16.to_le_bytes());
    tiff.extend_from_slice(&ifd_entry_inline_ascii2(0x0001, lat_ref));
    tiff.extend_from_slice(&ifd_entry(0x0002, 5, 3, 130));
    tiff.extend_from_slice(&ifd_entry_inline_ascii2(0x0003, lon_ref));
    tiff.extend_from_slice(&ifd_entry(0x0004, 5, 3, 154));
    tiff.extend_from_slice(&0u32.to_le_bytes());
    assert_eq!(tiff.len(), 130);

    for part in [lat.0, lat.1, lat.2] {
        tiff.extend_from_slice(&rational(part, 1));
    }
    for part in [lon.0, lon.1, lon.2] {
        tiff.extend_from_slice(&rational(part, 1));
    }
    assert_eq!(tiff.len(), 178);

    wrap_jpeg(&tiff)
}

fn ifd_entry(tag: u16, field_type: u16, count: u32, value: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&field_type.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&value.to_le_bytes());
    out
}

/// Two-byte ASCII values (a letter plus NUL) fit inline in the entry.
fn ifd_entry_inline_ascii2(tag: u16, letter: char) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.push(letter as u8);
    out.push(0);
    out.push(0);
    out.push(0);
    out
}

fn rational(numerator: u32, denominator: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&numerator.to_le_bytes());
    out.extend_from_slice(&denominator.to_le_bytes());
    out
}

fn wrap_jpeg(tiff: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&[0xFF, 0xD8]); // SOI
    out.extend_from_slice(&[0xFF, 0xE1]); // APP1
    let length = (2 + 6 + tiff.len()) as u16;
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(tiff);
    out.extend_from_slice(&[0xFF, 0xD9]); // EOI
    out
}

/// GeoNames-layout line for gazetteer fixtures.
pub fn gazetteer_line(
    id: u32,
    name: &str,
    lat: f64,
    lon: f64,
    country: &str,
    admin1: &str,
    admin2: &str,
    population: u64,
) -> String {
    format!(
        "{id}\t{name}\t{name}\t\t{lat}\t{lon}\tP\tPPL\t{country}\t\t{admin1}\t{admin2}\t\t\t{population}\t\t\t\tUTC\t2024-01-01"
    )
}
