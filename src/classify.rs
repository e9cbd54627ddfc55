//! Piece classifier.
//! Tries the four pawn templates in a fixed order and takes the first match.
//! Nothing matching means the square is empty; other piece types are not
//! recognized and read as empty too.

use image::GrayImage;
use std::fmt;

use crate::fen::Occupant;
use crate::matcher::{FeatureMatcher, Features};
use crate::templates::TemplateSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SquareLabel {
    Empty,
    BlackPawnDarkSquare,
    BlackPawnLightSquare,
    WhitePawnDarkSquare,
    WhitePawnLightSquare,
}

impl SquareLabel {
    /// Order in which pawn templates are tried.
    pub const PRIORITY: [SquareLabel; 4] = [
        SquareLabel::BlackPawnDarkSquare,
        SquareLabel::BlackPawnLightSquare,
        SquareLabel::WhitePawnDarkSquare,
        SquareLabel::WhitePawnLightSquare,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SquareLabel::Empty => "empty",
            SquareLabel::BlackPawnDarkSquare => "black-pawn-dark-square",
            SquareLabel::BlackPawnLightSquare => "black-pawn-light-square",
            SquareLabel::WhitePawnDarkSquare => "white-pawn-dark-square",
            SquareLabel::WhitePawnLightSquare => "white-pawn-light-square",
        }
    }

    pub fn occupant(self) -> Occupant {
        match self {
            SquareLabel::Empty => Occupant::Empty,
            SquareLabel::BlackPawnDarkSquare | SquareLabel::BlackPawnLightSquare => {
                Occupant::BlackPawn
            }
            SquareLabel::WhitePawnDarkSquare | SquareLabel::WhitePawnLightSquare => {
                Occupant::WhitePawn
            }
        }
    }
}

impl fmt::Display for SquareLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(
    square: &GrayImage,
    templates: &TemplateSet,
    matcher: &FeatureMatcher,
    threshold: u32,
) -> SquareLabel {
    classify_features(&matcher.features(square), templates, matcher, threshold)
}

/// First-match-wins; later templates are not evaluated once one matches.
pub fn classify_features(
    square: &Features,
    templates: &TemplateSet,
    matcher: &FeatureMatcher,
    threshold: u32,
) -> SquareLabel {
    if square.is_empty() {
        return SquareLabel::Empty;
    }
    templates
        .pawns()
        .into_iter()
        .find(|(_, template)| {
            matcher
                .compare_features(square, template.features(), threshold)
                .matched
        })
        .map_or(SquareLabel::Empty, |(label, _)| label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::tests::texture;
    use crate::templates::tests::{blank, template_set};

    const THRESHOLD: u32 = 20;

    #[test]
    fn test_label_names_and_occupants() {
        assert_eq!(SquareLabel::Empty.to_string(), "empty");
        assert_eq!(
            SquareLabel::WhitePawnLightSquare.as_str(),
            "white-pawn-light-square"
        );
        assert_eq!(SquareLabel::BlackPawnLightSquare.occupant(), Occupant::BlackPawn);
        assert_eq!(SquareLabel::WhitePawnDarkSquare.occupant(), Occupant::WhitePawn);
        assert_eq!(SquareLabel::Empty.occupant(), Occupant::Empty);
    }

    #[test]
    fn test_blank_square_is_empty() {
        let matcher = FeatureMatcher::default();
        let pawn = texture(5, 96, 3);
        let set = template_set(
            &matcher,
            [pawn.clone(), pawn.clone(), pawn.clone(), pawn],
            blank(32),
            blank(32),
        );
        assert_eq!(
            classify(&blank(96), &set, &matcher, THRESHOLD),
            SquareLabel::Empty
        );
    }

    #[test]
    fn test_black_templates_win_over_white() {
        let matcher = FeatureMatcher::default();
        let pawn = texture(5, 96, 3);
        // Both a black and a white template would match this square.
        let set = template_set(
            &matcher,
            [blank(96), pawn.clone(), pawn.clone(), pawn.clone()],
            blank(32),
            blank(32),
        );
        assert_eq!(
            classify(&pawn, &set, &matcher, THRESHOLD),
            SquareLabel::BlackPawnLightSquare
        );
    }

    #[test]
    fn test_each_template_is_reachable() {
        let matcher = FeatureMatcher::default();
        let pawns = [
            texture(21, 96, 3),
            texture(22, 96, 3),
            texture(23, 96, 3),
            texture(24, 96, 3),
        ];
        let set = template_set(&matcher, pawns.clone(), blank(32), blank(32));
        for (image, label) in pawns.iter().zip(SquareLabel::PRIORITY) {
            assert_eq!(classify(image, &set, &matcher, THRESHOLD), label);
        }
        assert_eq!(
            classify(&texture(99, 96, 3), &set, &matcher, THRESHOLD),
            SquareLabel::Empty
        );
    }
}
