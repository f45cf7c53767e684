use lazy_static::lazy_static;
use rand::{distr::Alphanumeric, Rng};
use regex::{Captures, Regex};

lazy_static! {
    static ref PARENTHESIS_RE: Regex = Regex::new(r"\([^)]*\)").expect("invalid regex");
    static ref CAPITAL_DIGIT_RUN_RE: Regex =
        Regex::new(r"[A-Z](?:[0-9][A-Z])+").expect("invalid regex");
    static ref SPACED_DIGIT_CAPITAL_RE: Regex =
        Regex::new(r"(^|\s)([0-9]+[A-Z])(\s|$)").expect("invalid regex");
    static ref ACRONYM_RE: Regex = Regex::new(r"[A-Z]{2,}").expect("invalid regex");
    static ref CAMEL_BOUNDARY_RE: Regex = Regex::new(r"([^A-Z])([A-Z])").expect("invalid regex");
    static ref LETTER_DIGIT_RE: Regex =
        Regex::new(r"([A-Za-z])([0-9]+)([^A-Za-z0-9]|$)").expect("invalid regex");
    static ref NON_WORD_RE: Regex = Regex::new(r"\W+").expect("invalid regex");
    static ref UNDERSCORE_RUN_RE: Regex = Regex::new(r"_{2,}").expect("invalid regex");
}

/// Standardizes a raw report/field name into a SQL-safe snake_case identifier
/// with both cleanup flags enabled. This is the form the schema synthesizer and
/// the upsert engine run every incoming column name through.
pub fn standardize_name(raw: &str) -> String {
    standardize(raw, true, true)
}

/// Converts an arbitrary source field name (camelCase, spaced, punctuated) into
/// a SQL-safe snake_case identifier.
///
/// Applied transformations, in order:
/// 1. strip a trailing file extension (text after the last `.`) if requested
/// 2. strip parenthesized suffixes and their contents if requested
/// 3. camel/Pascal boundary handling: capital-digit alternations ("B2B") and
///    acronym runs ("ASIN") are ring-fenced and lowercased as one unit, a
///    space-delimited digit-run-plus-capital ("1D") is lowercased in place,
///    then underscores are inserted before capitals and between a letter and a
///    following digit run
/// 4. lowercase, collapse non-word runs to single underscores, trim
/// 5. wrap in double quotes when the name starts with a digit (postgres
///    forbids bare leading-digit identifiers)
///
/// Never fails: degenerate input collapses to `_`. Re-applying the function to
/// its own output returns the same string.
pub fn standardize(name: &str, remove_parenthesis: bool, remove_file_extension: bool) -> String {
    let mut s = name.to_string();

    if remove_file_extension {
        if let Some(dot) = s.rfind('.') {
            s.truncate(dot);
        }
    }

    if remove_parenthesis {
        s = PARENTHESIS_RE.replace_all(&s, "").into_owned();
    }

    s = CAPITAL_DIGIT_RUN_RE
        .replace_all(&s, |caps: &Captures| format!("_{}_", caps[0].to_lowercase()))
        .into_owned();

    // The trailing space of one match can swallow the leading space of the
    // next ("1D 2D"), so run to a fixpoint. Two passes cover any input.
    for _ in 0..2 {
        s = SPACED_DIGIT_CAPITAL_RE
            .replace_all(&s, |caps: &Captures| {
                format!("{}{}{}", &caps[1], caps[2].to_lowercase(), &caps[3])
            })
            .into_owned();
    }

    s = ACRONYM_RE
        .replace_all(&s, |caps: &Captures| format!("_{}_", caps[0].to_lowercase()))
        .into_owned();

    s = CAMEL_BOUNDARY_RE.replace_all(&s, "${1}_${2}").into_owned();

    s = LETTER_DIGIT_RE
        .replace_all(&s, |caps: &Captures| {
            let letter = caps.get(1).expect("letter group always present");
            if letter.start() == 0 {
                // leading tokens like "H10" keep their digits attached
                caps[0].to_string()
            } else {
                format!("{}_{}{}", &caps[1], &caps[2], &caps[3])
            }
        })
        .into_owned();

    s = s.to_lowercase();
    s = NON_WORD_RE.replace_all(&s, "_").into_owned();
    s = UNDERSCORE_RUN_RE.replace_all(&s, "_").into_owned();

    let trimmed = s.trim_matches('_');
    let result = if trimmed.is_empty() {
        if name.is_empty() {
            return String::new();
        }
        "_".to_string()
    } else {
        trimmed.to_string()
    };

    if result.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("\"{result}\"")
    } else {
        result
    }
}

pub fn generate_random_id(len: usize) -> String {
    rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardize_camel_and_pascal() {
        assert_eq!(standardize_name("campaignName"), "campaign_name");
        assert_eq!(standardize_name("CampaignName"), "campaign_name");
        assert_eq!(standardize_name("campaign_name"), "campaign_name");
        assert_eq!(standardize_name("fulfillableQuantity"), "fulfillable_quantity");
        assert_eq!(standardize_name("totalReservedQuantity"), "total_reserved_quantity");
    }

    #[test]
    fn test_standardize_report_headers() {
        assert_eq!(standardize_name("Keyword Phrase"), "keyword_phrase");
        assert_eq!(standardize_name("Search Volume Trend"), "search_volume_trend");
        assert_eq!(standardize_name("ABA Total Click Share"), "aba_total_click_share");
        assert_eq!(standardize_name("Impressions: ASIN Share %"), "impressions_asin_share");
        assert_eq!(
            standardize_name("Cart Adds: Same Day Shipping Speed"),
            "cart_adds_same_day_shipping_speed"
        );
    }

    #[test]
    fn test_standardize_digit_capital_tokens() {
        assert_eq!(standardize_name("Clicks: 1D Shipping Speed"), "clicks_1d_shipping_speed");
        assert_eq!(standardize_name("Purchases: 2D Shipping Speed"), "purchases_2d_shipping_speed");
        assert_eq!(standardize_name("B2B Sales"), "b2b_sales");
        assert_eq!(standardize_name("Sales B2B"), "sales_b2b");
    }

    #[test]
    fn test_standardize_letter_digit_boundary() {
        assert_eq!(standardize_name("arg1"), "arg_1");
        assert_eq!(standardize_name("ERC20"), "erc_20");
        // a leading token keeps its digits attached
        assert_eq!(standardize_name("H10 PPC Bid"), "h10_ppc_bid");
    }

    #[test]
    fn test_standardize_parenthesis_and_extension() {
        assert_eq!(standardize_name("Sponsored Rank (avg)"), "sponsored_rank");
        assert_eq!(standardize("Sponsored Rank (avg)", false, false), "sponsored_rank_avg");
        assert_eq!(standardize_name("US_sqp_week_2024_01_01.csv"), "us_sqp_week_2024_01_01");
        assert_eq!(standardize("report.name.csv", false, true), "report_name");
    }

    #[test]
    fn test_standardize_leading_digit_is_quoted() {
        assert_eq!(standardize_name("123 Main"), "\"123_main\"");
        assert_eq!(standardize_name("1d shipping"), "\"1d_shipping\"");
    }

    #[test]
    fn test_standardize_degenerate_input() {
        assert_eq!(standardize_name("!!!"), "_");
        assert_eq!(standardize_name("   "), "_");
        assert_eq!(standardize_name(""), "");
    }

    #[test]
    fn test_standardize_is_idempotent() {
        let samples = [
            "Keyword Phrase",
            "Impressions: ASIN Share %",
            "Clicks: 1D Shipping Speed",
            "B2B Sales",
            "campaignName",
            "123 Main St",
            "Sponsored Rank (avg)",
            "H10 PPC Sugg. Bid",
            "ERC20",
            "!!!",
            "",
        ];
        for sample in samples {
            let once = standardize_name(sample);
            assert_eq!(standardize_name(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_generate_random_id() {
        let id = generate_random_id(10);
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
