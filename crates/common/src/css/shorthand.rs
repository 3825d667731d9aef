//! Box shorthands written either way compare equal.
//!
//! `padding-top/right/bottom/left` and `padding: a b` describe the same rule;
//! both are rewritten to the shortest `padding` value. Same for `margin` and
//! `inset`.

use super::Declarations;

/// Shorthand name and its longhands in top, right, bottom, left order
const BOX_SHORTHANDS: &[(&str, [&str; 4])] = &[
    ("padding", ["padding-top", "padding-right", "padding-bottom", "padding-left"]),
    ("margin", ["margin-top", "margin-right", "margin-bottom", "margin-left"]),
    ("inset", ["top", "right", "bottom", "left"]),
];

pub(super) fn fold_box_shorthands(declarations: &mut Declarations) {
    for (shorthand, longhands) in BOX_SHORTHANDS {
        if let Some(sides) = take_longhands(declarations, longhands) {
            declarations.insert(shorthand.to_string(), compact(&sides));
        } else if let Some(value) = declarations.get_mut(*shorthand) {
            if let Some(sides) = expand(value) {
                *value = compact(&sides);
            }
        }
    }
}

/// Remove all four longhands when present and foldable
fn take_longhands(declarations: &mut Declarations, longhands: &[&str; 4]) -> Option<[String; 4]> {
    let values: Vec<&String> = longhands
        .iter()
        .filter_map(|name| declarations.get(*name))
        .collect();
    if values.len() != 4 || values.iter().any(|v| !is_single_token(v)) {
        return None;
    }

    let sides = [values[0].clone(), values[1].clone(), values[2].clone(), values[3].clone()];
    for name in longhands {
        declarations.remove(*name);
    }
    Some(sides)
}

/// Per-side values of a 1 to 4 token shorthand
fn expand(value: &str) -> Option<[String; 4]> {
    if value.contains('!') || value.contains('(') {
        return None;
    }
    let parts: Vec<&str> = value.split_whitespace().collect();
    let [top, right, bottom, left] = match parts.as_slice() {
        [all] => [*all; 4],
        [vertical, horizontal] => [*vertical, *horizontal, *vertical, *horizontal],
        [top, horizontal, bottom] => [*top, *horizontal, *bottom, *horizontal],
        [top, right, bottom, left] => [*top, *right, *bottom, *left],
        _ => return None,
    };
    Some([top.to_string(), right.to_string(), bottom.to_string(), left.to_string()])
}

fn compact([top, right, bottom, left]: &[String; 4]) -> String {
    if left != right {
        format!("{top} {right} {bottom} {left}")
    } else if top != bottom {
        format!("{top} {right} {bottom}")
    } else if top != right {
        format!("{top} {right}")
    } else {
        top.clone()
    }
}

fn is_single_token(value: &str) -> bool {
    !value.is_empty() && !value.contains(char::is_whitespace) && !value.contains('!')
}
