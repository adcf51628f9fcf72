//! Width-rate properties against synthetic fonts generated at test time.

mod common;

use common::{build_font, catalog_from, uniform_font, FULL_COVERAGE_GLYPHS};
use termchat::font::FontError;

#[test]
fn ascii_is_one_regardless_of_fonts() {
    let (_dir, catalog) = catalog_from(&[("wide.ttf", uniform_font(1000, 1000, 128))]);
    for ch in ['A', 'z', '0', ' ', '~'] {
        assert_eq!(catalog.width_rate(ch, 16).unwrap(), 1, "char {ch:?}");
    }
}

#[test]
fn cjk_ideograph_is_two_with_full_coverage() {
    // advance == unitsPerEm: width equals the font size, rate 2.
    let (_dir, catalog) = catalog_from(&[(
        "cjk.ttf",
        uniform_font(1000, 1000, FULL_COVERAGE_GLYPHS),
    )]);
    assert_eq!(catalog.width_rate('中', 16).unwrap(), 2);
    assert_eq!(catalog.width_rate('风', 16).unwrap(), 2);
}

#[test]
fn half_advance_is_one() {
    let (_dir, catalog) = catalog_from(&[(
        "narrow.ttf",
        uniform_font(1000, 500, FULL_COVERAGE_GLYPHS),
    )]);
    assert_eq!(catalog.width_rate('中', 16).unwrap(), 1);
}

#[test]
fn rate_is_averaged_across_fonts() {
    // One font votes 16px, the other 8px at size 16: avg 12, rate
    // round(12/16*2) = round(1.5) = 2.
    let (_dir, catalog) = catalog_from(&[
        ("wide.ttf", uniform_font(1000, 1000, FULL_COVERAGE_GLYPHS)),
        ("narrow.ttf", uniform_font(1000, 500, FULL_COVERAGE_GLYPHS)),
    ]);
    assert_eq!(catalog.width_rate('中', 16).unwrap(), 2);
}

#[test]
fn font_without_coverage_abstains() {
    // The small font covers only 128 glyph slots, so it errors for the
    // ideograph and only the wide font votes.
    let (_dir, catalog) = catalog_from(&[
        ("small.ttf", uniform_font(1000, 500, 128)),
        ("wide.ttf", uniform_font(1000, 1000, FULL_COVERAGE_GLYPHS)),
    ]);
    assert_eq!(catalog.width_rate('中', 16).unwrap(), 2);
}

#[test]
fn no_coverage_anywhere_is_an_error() {
    let (_dir, catalog) = catalog_from(&[("small.ttf", uniform_font(1000, 500, 128))]);
    assert!(matches!(
        catalog.width_rate('中', 16),
        Err(FontError::NoCoverage('中'))
    ));
}

#[test]
fn glyph_id_base_comes_from_cmap_offset() {
    // gid_base 3 shifts every lookup: ü (U+00FC) hits advances[0xFF].
    let mut advances = vec![250u16; 0x110];
    advances[0xFF] = 1000;
    let (_dir, catalog) = catalog_from(&[("base.ttf", build_font(3, 1000, &advances))]);
    assert_eq!(catalog.width_rate('ü', 16).unwrap(), 2);
    // ý lands one slot later, on a quarter-em: rate round(0.5) = 1.
    assert_eq!(catalog.width_rate('ý', 16).unwrap(), 1);
}

#[test]
fn fit_never_splits_a_wide_glyph() {
    let (_dir, catalog) = common::wide_catalog();
    // "a" fits, the first ideograph fits (3 of 4 columns), the second
    // would straddle the boundary: it is dropped and the slack padded.
    let fitted = termchat::layout::fit_width("a中中", 4, &catalog);
    assert_eq!(fitted, "a中 ");
    assert_eq!(termchat::layout::display_width(&fitted, &catalog), 4);

    // A glyph straddling the very first column yields pure padding.
    let fitted = termchat::layout::fit_width("中", 1, &catalog);
    assert_eq!(fitted, " ");
}

#[test]
fn malformed_font_is_skipped_at_load() {
    let (_dir, catalog) = catalog_from(&[
        ("broken.ttf", b"not a font at all".to_vec()),
        ("good.ttf", uniform_font(1000, 1000, FULL_COVERAGE_GLYPHS)),
    ]);
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.width_rate('中', 16).unwrap(), 2);
}

#[test]
fn non_ttf_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("README.md"), "not a font").unwrap();
    std::fs::write(
        dir.path().join("real.ttf"),
        uniform_font(1000, 1000, FULL_COVERAGE_GLYPHS),
    )
    .unwrap();
    let catalog = termchat::font::FontCatalog::load_dir(dir.path()).unwrap();
    assert_eq!(catalog.len(), 1);
}

#[test]
fn missing_font_dir_is_an_error() {
    assert!(termchat::font::FontCatalog::load_dir(std::path::Path::new("/nonexistent/fonts")).is_err());
}
