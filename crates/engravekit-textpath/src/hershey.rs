//! Built-in single-stroke glyphs
//!
//! Each glyph lives in a cell 10 units high with the baseline at y = 0 and
//! advances the cursor by [`ADVANCE`] units. A glyph is a list of strokes;
//! each stroke is an open polyline drawn without lifting the beam.

/// Glyph cell height in font units
pub const CELL_HEIGHT: f64 = 10.0;

/// Horizontal cursor advance per character in font units
pub const ADVANCE: f64 = 10.0;

pub type Stroke = &'static [(f64, f64)];

const RING: Stroke = &[
    (1.0, 2.0),
    (1.0, 8.0),
    (3.0, 10.0),
    (7.0, 10.0),
    (9.0, 8.0),
    (9.0, 2.0),
    (7.0, 0.0),
    (3.0, 0.0),
    (1.0, 2.0),
];

const BOWL: Stroke = &[
    (0.0, 0.0),
    (0.0, 10.0),
    (7.0, 10.0),
    (9.0, 8.0),
    (9.0, 6.0),
    (7.0, 5.0),
    (0.0, 5.0),
];

static GLYPHS: &[(char, &[Stroke])] = &[
    (' ', &[]),
    ('A', &[&[(0.0, 0.0), (5.0, 10.0), (10.0, 0.0)], &[(2.5, 5.0), (7.5, 5.0)]]),
    (
        'B',
        &[
            BOWL,
            &[(7.0, 5.0), (9.0, 3.0), (9.0, 1.0), (7.0, 0.0), (0.0, 0.0)],
        ],
    ),
    (
        'C',
        &[&[
            (9.0, 2.0),
            (7.0, 0.0),
            (3.0, 0.0),
            (1.0, 2.0),
            (1.0, 8.0),
            (3.0, 10.0),
            (7.0, 10.0),
            (9.0, 8.0),
        ]],
    ),
    (
        'D',
        &[&[
            (0.0, 0.0),
            (0.0, 10.0),
            (6.0, 10.0),
            (9.0, 7.0),
            (9.0, 3.0),
            (6.0, 0.0),
            (0.0, 0.0),
        ]],
    ),
    (
        'E',
        &[
            &[(9.0, 0.0), (0.0, 0.0), (0.0, 10.0), (9.0, 10.0)],
            &[(0.0, 5.0), (6.0, 5.0)],
        ],
    ),
    (
        'F',
        &[&[(0.0, 0.0), (0.0, 10.0), (9.0, 10.0)], &[(0.0, 5.0), (6.0, 5.0)]],
    ),
    (
        'G',
        &[&[
            (9.0, 8.0),
            (7.0, 10.0),
            (3.0, 10.0),
            (1.0, 8.0),
            (1.0, 2.0),
            (3.0, 0.0),
            (7.0, 0.0),
            (9.0, 2.0),
            (9.0, 5.0),
            (5.0, 5.0),
        ]],
    ),
    (
        'H',
        &[
            &[(0.0, 0.0), (0.0, 10.0)],
            &[(9.0, 0.0), (9.0, 10.0)],
            &[(0.0, 5.0), (9.0, 5.0)],
        ],
    ),
    (
        'I',
        &[
            &[(2.0, 0.0), (7.0, 0.0)],
            &[(4.5, 0.0), (4.5, 10.0)],
            &[(2.0, 10.0), (7.0, 10.0)],
        ],
    ),
    (
        'J',
        &[&[
            (0.0, 2.0),
            (2.0, 0.0),
            (7.0, 0.0),
            (9.0, 2.0),
            (9.0, 10.0),
            (4.0, 10.0),
        ]],
    ),
    (
        'K',
        &[
            &[(0.0, 0.0), (0.0, 10.0)],
            &[(9.0, 10.0), (0.0, 5.0)],
            &[(3.0, 6.0), (9.0, 0.0)],
        ],
    ),
    ('L', &[&[(0.0, 10.0), (0.0, 0.0), (9.0, 0.0)]]),
    (
        'M',
        &[&[(0.0, 0.0), (0.0, 10.0), (5.0, 5.0), (10.0, 10.0), (10.0, 0.0)]],
    ),
    ('N', &[&[(0.0, 0.0), (0.0, 10.0), (9.0, 0.0), (9.0, 10.0)]]),
    ('O', &[RING]),
    ('P', &[BOWL]),
    ('Q', &[RING, &[(6.0, 3.0), (10.0, -1.0)]]),
    ('R', &[BOWL, &[(5.0, 5.0), (9.0, 0.0)]]),
    (
        'S',
        &[&[
            (9.0, 8.0),
            (7.0, 10.0),
            (3.0, 10.0),
            (1.0, 8.0),
            (1.0, 6.0),
            (3.0, 5.0),
            (7.0, 5.0),
            (9.0, 4.0),
            (9.0, 2.0),
            (7.0, 0.0),
            (3.0, 0.0),
            (1.0, 2.0),
        ]],
    ),
    (
        'T',
        &[&[(0.0, 10.0), (9.0, 10.0)], &[(4.5, 10.0), (4.5, 0.0)]],
    ),
    (
        'U',
        &[&[
            (0.0, 10.0),
            (0.0, 2.0),
            (2.0, 0.0),
            (7.0, 0.0),
            (9.0, 2.0),
            (9.0, 10.0),
        ]],
    ),
    ('V', &[&[(0.0, 10.0), (5.0, 0.0), (10.0, 10.0)]]),
    (
        'W',
        &[&[(0.0, 10.0), (2.0, 0.0), (5.0, 5.0), (8.0, 0.0), (10.0, 10.0)]],
    ),
    (
        'X',
        &[&[(0.0, 0.0), (9.0, 10.0)], &[(0.0, 10.0), (9.0, 0.0)]],
    ),
    (
        'Y',
        &[&[(0.0, 10.0), (5.0, 5.0), (10.0, 10.0)], &[(5.0, 5.0), (5.0, 0.0)]],
    ),
    ('Z', &[&[(0.0, 10.0), (9.0, 10.0), (0.0, 0.0), (9.0, 0.0)]]),
    ('0', &[RING]),
    (
        '1',
        &[&[(3.0, 8.0), (5.0, 10.0), (5.0, 0.0)], &[(2.0, 0.0), (8.0, 0.0)]],
    ),
    (
        '2',
        &[&[
            (1.0, 8.0),
            (3.0, 10.0),
            (7.0, 10.0),
            (9.0, 8.0),
            (9.0, 6.0),
            (1.0, 0.0),
            (9.0, 0.0),
        ]],
    ),
    (
        '3',
        &[
            &[
                (1.0, 8.0),
                (3.0, 10.0),
                (7.0, 10.0),
                (9.0, 8.0),
                (9.0, 2.0),
                (7.0, 0.0),
                (3.0, 0.0),
                (1.0, 2.0),
            ],
            &[(3.0, 5.0), (7.0, 5.0)],
        ],
    ),
    (
        '4',
        &[&[(7.0, 10.0), (1.0, 4.0), (9.0, 4.0)], &[(7.0, 10.0), (7.0, 0.0)]],
    ),
    (
        '5',
        &[&[
            (9.0, 10.0),
            (1.0, 10.0),
            (1.0, 5.0),
            (7.0, 5.0),
            (9.0, 3.0),
            (9.0, 2.0),
            (7.0, 0.0),
            (3.0, 0.0),
            (1.0, 2.0),
        ]],
    ),
    (
        '6',
        &[&[
            (7.0, 10.0),
            (3.0, 10.0),
            (1.0, 8.0),
            (1.0, 2.0),
            (3.0, 0.0),
            (7.0, 0.0),
            (9.0, 2.0),
            (9.0, 4.0),
            (7.0, 5.0),
            (3.0, 5.0),
        ]],
    ),
    ('7', &[&[(1.0, 10.0), (9.0, 10.0), (4.0, 0.0)]]),
    (
        '8',
        &[&[
            (3.0, 5.0),
            (1.0, 6.0),
            (1.0, 8.0),
            (3.0, 10.0),
            (7.0, 10.0),
            (9.0, 8.0),
            (9.0, 6.0),
            (7.0, 5.0),
            (3.0, 5.0),
            (1.0, 4.0),
            (1.0, 2.0),
            (3.0, 0.0),
            (7.0, 0.0),
            (9.0, 2.0),
            (9.0, 4.0),
            (7.0, 5.0),
        ]],
    ),
    (
        '9',
        &[&[
            (9.0, 5.0),
            (7.0, 5.0),
            (3.0, 4.0),
            (1.0, 2.0),
            (1.0, 1.0),
            (3.0, 0.0),
            (7.0, 0.0),
            (9.0, 2.0),
            (9.0, 8.0),
            (7.0, 10.0),
            (3.0, 10.0),
            (1.0, 8.0),
        ]],
    ),
    ('-', &[&[(1.0, 5.0), (8.0, 5.0)]]),
    ('_', &[&[(0.0, 0.0), (9.0, 0.0)]]),
    ('.', &[&[(4.0, 0.0), (5.0, 1.0)]]),
    (
        '!',
        &[&[(4.5, 3.0), (4.5, 10.0)], &[(4.5, 0.0), (5.0, 1.0)]],
    ),
    (
        '?',
        &[
            &[
                (1.0, 8.0),
                (3.0, 10.0),
                (7.0, 10.0),
                (9.0, 8.0),
                (9.0, 6.0),
                (5.0, 4.0),
                (5.0, 2.0),
            ],
            &[(5.0, 0.0), (5.5, 1.0)],
        ],
    ),
];

/// Strokes for `ch`; lowercase ASCII letters use the uppercase glyph.
pub fn glyph(ch: char) -> Option<&'static [Stroke]> {
    let key = ch.to_ascii_uppercase();
    GLYPHS
        .iter()
        .find(|(c, _)| *c == key)
        .map(|(_, strokes)| *strokes)
}

/// Every character with a glyph, in table order
pub fn supported_chars() -> impl Iterator<Item = char> {
    GLYPHS.iter().map(|(c, _)| *c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_folding() {
        assert_eq!(glyph('a'), glyph('A'));
        assert!(glyph('z').is_some());
        assert!(glyph('@').is_none());
        assert!(glyph('é').is_none());
    }

    #[test]
    fn test_space_has_no_strokes() {
        assert_eq!(glyph(' ').map(|g| g.len()), Some(0));
    }

    #[test]
    fn test_glyphs_stay_near_cell() {
        for ch in supported_chars() {
            let strokes = glyph(ch).unwrap();
            for stroke in strokes {
                assert!(stroke.len() >= 2, "stroke of '{}' is a single point", ch);
                for &(x, y) in stroke.iter() {
                    assert!((0.0..=ADVANCE).contains(&x), "'{}' x={}", ch, x);
                    assert!((-1.0..=CELL_HEIGHT).contains(&y), "'{}' y={}", ch, y);
                }
            }
        }
    }
}
