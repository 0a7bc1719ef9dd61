//! Per-sample genotype filtering and heuristic correction.
//!
//! A call is nulled when its depth, quality or allele fraction is too low,
//! and reclassified between HET and HV when its allele fraction clearly
//! contradicts the caller's decision. Thresholds come from [`FilterParams`].

use crate::{
    constants::*,
    error::VcfCleanError,
    utils::util::{round2, Result},
};

#[derive(Clone, Debug, PartialEq)]
pub struct FilterParams {
    pub min_dp: u32,
    pub min_gq: u32,
    pub min_af: f64,
    pub min_dp_hv: u32,
    pub min_af_hv: f64,
    pub min_dp_het: u32,
    pub min_af_het: f64,
    pub max_af_het: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            min_dp: DEFAULT_MIN_DP,
            min_gq: DEFAULT_MIN_GQ,
            min_af: DEFAULT_MIN_AF,
            min_dp_hv: DEFAULT_MIN_DP_HV,
            min_af_hv: DEFAULT_MIN_AF_HV,
            min_dp_het: DEFAULT_MIN_DP_HET,
            min_af_het: DEFAULT_MIN_AF_HET,
            max_af_het: DEFAULT_MAX_AF_HET,
        }
    }
}

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, updates: impl FnOnce(&mut Self)) -> Self {
        updates(&mut self);
        self
    }

    /// Checks that the thresholds are usable and that HET/HV bands cannot
    /// overlap, which keeps the correction idempotent.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min-af", self.min_af),
            ("min-af-hv", self.min_af_hv),
            ("min-af-het", self.min_af_het),
            ("max-af-het", self.max_af_het),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(crate::vcfclean_error!(
                    "{name} must be within [0, 1], got {value}"
                ));
            }
        }
        if self.min_af_het > self.max_af_het {
            return Err(crate::vcfclean_error!(
                "min-af-het ({}) must be <= max-af-het ({})",
                self.min_af_het,
                self.max_af_het
            ));
        }
        if self.max_af_het >= self.min_af_hv {
            return Err(crate::vcfclean_error!(
                "max-af-het ({}) must be < min-af-hv ({})",
                self.max_af_het,
                self.min_af_hv
            ));
        }
        Ok(())
    }
}

/// Positions of the genotype fields within one record's FORMAT.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormatLayout {
    pub gt: usize,
    pub dp: Option<usize>,
    pub dpi: Option<usize>,
    pub ad: Option<usize>,
    pub gq: Option<usize>,
    pub gqx: Option<usize>,
    pub af: Option<usize>,
}

impl FormatLayout {
    pub fn from_keys(keys: &[String]) -> Result<Self> {
        let find = |key: &str| keys.iter().position(|k| k == key);
        match find("GT") {
            Some(0) => Ok(Self {
                gt: 0,
                dp: find("DP"),
                dpi: find("DPI"),
                ad: find("AD"),
                gq: find("GQ"),
                gqx: find("GQX"),
                af: find("AF"),
            }),
            _ => Err(VcfCleanError::MissingFormatField {
                field: "GT (as first FORMAT key)".to_string(),
            }),
        }
    }

    /// FORMAT keys of a corrected record: GT, then AF, then everything else.
    pub fn output_keys(&self, keys: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(keys.len() + 1);
        out.push("GT".to_string());
        out.push("AF".to_string());
        out.extend(
            keys.iter()
                .enumerate()
                .filter(|(index, _)| *index != self.gt && Some(*index) != self.af)
                .map(|(_, key)| key.clone()),
        );
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    Unchanged,
    NoCall,
    ToHomVar,
    ToHet,
}

/// Canonical call of one sample, derived from its FORMAT values.
#[derive(Clone, Debug, PartialEq)]
pub struct GenotypeCall {
    pub a1: u32,
    pub a2: u32,
    pub depth: Option<u32>,
    pub quality: Option<f64>,
    pub allele_fraction: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CorrectedCall {
    pub outcome: CallOutcome,
    pub call: Option<GenotypeCall>,
}

impl CorrectedCall {
    fn nocall() -> Self {
        Self {
            outcome: CallOutcome::NoCall,
            call: None,
        }
    }

    pub fn is_nocall(&self) -> bool {
        self.call.is_none()
    }

    pub fn is_non_reference(&self) -> bool {
        self.call.as_ref().is_some_and(|call| call.a2 > 0)
    }

    /// Renders the sample column values in [`FormatLayout::output_keys`] order.
    pub fn render(&self, values: &[String], layout: &FormatLayout) -> Vec<String> {
        let Some(call) = &self.call else {
            return vec![NOCALL.to_string()];
        };
        let mut out = Vec::with_capacity(values.len() + 1);
        out.push(format!("{}/{}", call.a1, call.a2));
        out.push(match call.allele_fraction {
            Some(af) => format!("{af:.2}"),
            None => MISSING_VALUE.to_string(),
        });
        out.extend(
            values
                .iter()
                .enumerate()
                .filter(|(index, _)| *index != layout.gt && Some(*index) != layout.af)
                .map(|(_, value)| value.clone()),
        );
        out
    }
}

fn field<'a>(values: &'a [String], index: Option<usize>) -> Option<&'a str> {
    index
        .and_then(|index| values.get(index))
        .map(String::as_str)
        .filter(|value| *value != MISSING_VALUE && !value.is_empty())
}

fn malformed(value: &str, sample: &str, message: impl Into<String>) -> VcfCleanError {
    VcfCleanError::MalformedGenotype {
        value: value.to_string(),
        sample: sample.to_string(),
        message: message.into(),
    }
}

fn parse_count(value: Option<&str>, name: &str, sample: &str) -> Result<Option<u32>> {
    match value {
        Some(value) => value
            .parse::<u32>()
            .map(Some)
            .map_err(|_| malformed(value, sample, format!("{name} is not a non-negative integer"))),
        None => Ok(None),
    }
}

fn parse_quality(value: Option<&str>, name: &str, sample: &str) -> Result<Option<f64>> {
    match value {
        Some(value) => value
            .parse::<f64>()
            .map(Some)
            .map_err(|_| malformed(value, sample, format!("{name} is not numeric"))),
        None => Ok(None),
    }
}

fn parse_allelic_depths(value: Option<&str>, sample: &str) -> Result<Option<Vec<u32>>> {
    let Some(value) = value else {
        return Ok(None);
    };
    value
        .split(',')
        .map(|depth| {
            if depth == MISSING_VALUE {
                Ok(0)
            } else {
                depth
                    .parse::<u32>()
                    .map_err(|_| malformed(value, sample, "AD is not a list of integers"))
            }
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Canonical allele pair, or `None` for a NOCALL.
fn parse_alleles(gt: &str, n_alleles: usize, sample: &str) -> Result<Option<(u32, u32)>> {
    let parts: Vec<&str> = gt.split(['/', '|']).collect();
    if parts.iter().any(|part| *part == MISSING_VALUE) {
        return Ok(None);
    }
    let mut alleles = Vec::with_capacity(2);
    for part in &parts {
        let allele = part
            .parse::<u32>()
            .map_err(|_| malformed(gt, sample, "allele is not an integer"))?;
        if allele as usize >= n_alleles {
            return Err(malformed(
                gt,
                sample,
                format!("allele {allele} exceeds the {n_alleles} alleles of the record"),
            ));
        }
        alleles.push(allele);
    }
    match alleles.as_slice() {
        [hemizygous] => Ok(Some((*hemizygous, *hemizygous))),
        [a, b] => Ok(Some(((*a).min(*b), (*a).max(*b)))),
        _ => Err(malformed(gt, sample, "expected one or two alleles")),
    }
}

impl GenotypeCall {
    /// Builds the canonical call of one sample; `None` when it is a NOCALL.
    pub fn from_sample(
        values: &[String],
        layout: &FormatLayout,
        n_alleles: usize,
        sample: &str,
    ) -> Result<Option<Self>> {
        let gt = match values.get(layout.gt).map(String::as_str) {
            None | Some("") | Some(MISSING_VALUE) => return Ok(None),
            Some(gt) => gt,
        };
        let Some((a1, a2)) = parse_alleles(gt, n_alleles, sample)? else {
            return Ok(None);
        };

        let dp = parse_count(field(values, layout.dp), "DP", sample)?;
        let dpi = parse_count(field(values, layout.dpi), "DPI", sample)?;
        let ad = parse_allelic_depths(field(values, layout.ad), sample)?;
        let ad_sum = match ad.as_ref() {
            Some(depths) => Some(
                depths
                    .iter()
                    .try_fold(0u32, |sum, depth| sum.checked_add(*depth))
                    .ok_or_else(|| malformed(gt, sample, "AD total overflows"))?,
            ),
            None => None,
        };
        let depth = [dp, dpi, ad_sum].into_iter().flatten().max();

        let gq = parse_quality(field(values, layout.gq), "GQ", sample)?;
        let gqx = parse_quality(field(values, layout.gqx), "GQX", sample)?;
        let quality = match (gq, gqx) {
            (Some(gq), Some(gqx)) => Some(gq.max(gqx)),
            (gq, gqx) => gq.or(gqx),
        };

        let variant_allele = if a1 == 0 && a2 > 0 {
            Some(a2)
        } else if a1 > 0 && a1 == a2 {
            Some(a1)
        } else {
            None
        };
        let allele_fraction = match (variant_allele, ad.as_ref(), depth) {
            (Some(allele), Some(depths), Some(depth)) if depth > 0 => {
                let supporting = depths.get(allele as usize).ok_or_else(|| {
                    malformed(
                        gt,
                        sample,
                        format!("AD has no entry for called allele {allele}"),
                    )
                })?;
                Some(round2(f64::from(*supporting) / f64::from(depth)))
            }
            _ => None,
        };

        Ok(Some(Self {
            a1,
            a2,
            depth,
            quality,
            allele_fraction,
        }))
    }

    pub fn is_het_with_reference(&self) -> bool {
        self.a1 == 0 && self.a2 > 0
    }

    pub fn is_hom_variant(&self) -> bool {
        self.a1 > 0 && self.a1 == self.a2
    }
}

/// Applies the depth, quality and allele-fraction thresholds, then the
/// HV/HET reclassification heuristics.
pub fn apply_filters(call: GenotypeCall, params: &FilterParams) -> CorrectedCall {
    match call.quality {
        Some(quality) if quality >= f64::from(params.min_gq) => {}
        _ => return CorrectedCall::nocall(),
    }
    let depth = match call.depth {
        Some(depth) if depth >= params.min_dp => depth,
        _ => return CorrectedCall::nocall(),
    };
    if matches!(call.allele_fraction, Some(af) if af < params.min_af) {
        return CorrectedCall::nocall();
    }

    let af = call.allele_fraction;
    if depth >= params.min_dp_hv
        && call.is_het_with_reference()
        && matches!(af, Some(af) if af >= params.min_af_hv)
    {
        let allele = call.a2;
        return CorrectedCall {
            outcome: CallOutcome::ToHomVar,
            call: Some(GenotypeCall {
                a1: allele,
                a2: allele,
                ..call
            }),
        };
    }
    if depth >= params.min_dp_het
        && call.is_hom_variant()
        && matches!(af, Some(af) if af >= params.min_af_het && af <= params.max_af_het)
    {
        let allele = call.a2;
        return CorrectedCall {
            outcome: CallOutcome::ToHet,
            call: Some(GenotypeCall {
                a1: 0,
                a2: allele,
                ..call
            }),
        };
    }

    CorrectedCall {
        outcome: CallOutcome::Unchanged,
        call: Some(call),
    }
}

/// Filters and corrects one sample of a record.
///
/// `spanning_deletion` is set when the record's sole ALT is `*`; such calls
/// are always nulled.
pub fn correct_genotype(
    values: &[String],
    layout: &FormatLayout,
    n_alleles: usize,
    spanning_deletion: bool,
    params: &FilterParams,
    sample: &str,
) -> Result<CorrectedCall> {
    let Some(call) = GenotypeCall::from_sample(values, layout, n_alleles, sample)? else {
        return Ok(CorrectedCall::nocall());
    };
    if spanning_deletion {
        return Ok(CorrectedCall::nocall());
    }
    Ok(apply_filters(call, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn values(sample: &str) -> Vec<String> {
        sample.split(':').map(str::to_string).collect()
    }

    fn keys(format: &str) -> Vec<String> {
        format.split(':').map(str::to_string).collect()
    }

    fn params() -> FilterParams {
        FilterParams::new().with(|p| {
            p.min_dp = 10;
            p.min_gq = 20;
            p.min_af = 0.15;
            p.min_dp_hv = 20;
            p.min_af_hv = 0.9;
            p.min_dp_het = 20;
            p.min_af_het = 0.25;
            p.max_af_het = 0.75;
        })
    }

    fn correct(format: &str, sample: &str, n_alleles: usize) -> CorrectedCall {
        let layout = FormatLayout::from_keys(&keys(format)).unwrap();
        correct_genotype(&values(sample), &layout, n_alleles, false, &params(), "S1").unwrap()
    }

    #[test]
    fn het_call_within_band_is_unchanged() {
        let corrected = correct("GT:DP:GQ:AD", "0/1:30:99:20,10", 2);
        assert_eq!(corrected.outcome, CallOutcome::Unchanged);
        let call = corrected.call.unwrap();
        assert_eq!((call.a1, call.a2), (0, 1));
        assert_eq!(call.depth, Some(30));
        assert_abs_diff_eq!(call.allele_fraction.unwrap(), 0.33, epsilon = 1e-9);
    }

    #[test]
    fn low_depth_is_nulled() {
        // AD is lowered too: depth is the largest of DP, DPI and the AD total.
        let corrected = correct("GT:DP:GQ:AD", "0/1:5:99:3,2", 2);
        assert_eq!(corrected.outcome, CallOutcome::NoCall);
        let layout = FormatLayout::from_keys(&keys("GT:DP:GQ:AD")).unwrap();
        assert_eq!(corrected.render(&values("0/1:5:99:3,2"), &layout), vec!["./."]);
    }

    #[test]
    fn low_dp_passes_when_allelic_depths_are_deep_enough() {
        let corrected = correct("GT:DP:GQ:AD", "0/1:5:99:20,10", 2);
        assert_eq!(corrected.outcome, CallOutcome::Unchanged);
        assert_eq!(corrected.call.unwrap().depth, Some(30));
    }

    #[test]
    fn overflowing_allelic_depths_are_malformed() {
        let layout = FormatLayout::from_keys(&keys("GT:DP:GQ:AD")).unwrap();
        let err = correct_genotype(
            &values("0/1:30:99:4294967295,1"),
            &layout,
            2,
            false,
            &params(),
            "S1",
        )
        .unwrap_err();
        assert!(matches!(err, VcfCleanError::MalformedGenotype { .. }));
    }

    #[test]
    fn depth_is_the_maximum_of_depth_fields() {
        let corrected = correct("GT:DP:DPI:GQ:AD", "0/1:5:12:99:3,3", 2);
        assert_eq!(corrected.call.unwrap().depth, Some(12));
        let corrected = correct("GT:DP:GQ:AD", "0/1:8:99:10,6", 2);
        assert_eq!(corrected.call.unwrap().depth, Some(16));
    }

    #[test]
    fn low_or_missing_quality_is_nulled() {
        assert!(correct("GT:DP:GQ:AD", "0/1:30:10:20,10", 2).is_nocall());
        assert!(correct("GT:DP:GQ:AD", "0/1:30:.:20,10", 2).is_nocall());
        assert!(correct("GT:DP:AD", "0/1:30:20,10", 2).is_nocall());
        let corrected = correct("GT:DP:GQ:GQX:AD", "0/1:30:10:40:20,10", 2);
        assert_eq!(corrected.outcome, CallOutcome::Unchanged);
    }

    #[test]
    fn low_allele_fraction_is_nulled() {
        assert!(correct("GT:DP:GQ:AD", "0/1:30:99:27,3", 2).is_nocall());
    }

    #[test]
    fn nocall_and_spanning_deletion_are_nulled() {
        assert!(correct("GT:DP:GQ:AD", "./.:30:99:20,10", 2).is_nocall());
        assert!(correct("GT:DP:GQ:AD", ".", 2).is_nocall());
        assert!(correct("GT:DP:GQ:AD", "./1:30:99:20,10", 2).is_nocall());
        let layout = FormatLayout::from_keys(&keys("GT:DP:GQ:AD")).unwrap();
        let corrected = correct_genotype(
            &values("0/1:30:99:20,10"),
            &layout,
            2,
            true,
            &params(),
            "S1",
        )
        .unwrap();
        assert!(corrected.is_nocall());
    }

    #[test]
    fn phased_and_hemizygous_calls_are_canonicalized() {
        let call = correct("GT:DP:GQ:AD", "1|0:30:99:20,10", 2).call.unwrap();
        assert_eq!((call.a1, call.a2), (0, 1));
        let call = correct("GT:DP:GQ:AD", "1:30:99:1,29", 2).call.unwrap();
        assert_eq!((call.a1, call.a2), (1, 1));
    }

    #[test]
    fn het_with_high_fraction_becomes_hom_variant() {
        let corrected = correct("GT:DP:GQ:AD", "0/1:40:99:2,38", 2);
        assert_eq!(corrected.outcome, CallOutcome::ToHomVar);
        let layout = FormatLayout::from_keys(&keys("GT:DP:GQ:AD")).unwrap();
        assert_eq!(
            corrected.render(&values("0/1:40:99:2,38"), &layout),
            vec!["1/1", "0.95", "40", "99", "2,38"]
        );
    }

    #[test]
    fn hom_variant_within_het_band_becomes_het() {
        let corrected = correct("GT:DP:GQ:AD", "2/2:40:99:20,0,20", 3);
        assert_eq!(corrected.outcome, CallOutcome::ToHet);
        let call = corrected.call.unwrap();
        assert_eq!((call.a1, call.a2), (0, 2));
        assert_abs_diff_eq!(call.allele_fraction.unwrap(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn reclassification_requires_enough_depth() {
        let corrected = correct("GT:DP:GQ:AD", "0/1:15:99:1,14", 2);
        assert_eq!(corrected.outcome, CallOutcome::Unchanged);
    }

    #[test]
    fn correction_is_idempotent() {
        let format = "GT:DP:GQ:AD";
        let layout = FormatLayout::from_keys(&keys(format)).unwrap();
        for sample in ["0/1:40:99:2,38", "1/1:40:99:20,20", "0/1:30:99:20,10"] {
            let first = correct(format, sample, 2);
            let rendered = first.render(&values(sample), &layout);
            let out_keys = layout.output_keys(&keys(format));
            let out_layout = FormatLayout::from_keys(&out_keys).unwrap();
            let second = correct_genotype(&rendered, &out_layout, 2, false, &params(), "S1")
                .unwrap();
            assert_eq!(second.outcome, CallOutcome::Unchanged, "sample {sample}");
            assert_eq!(second.render(&rendered, &out_layout), rendered);
        }
    }

    #[test]
    fn allele_fraction_is_not_applicable_for_ref_and_two_alt_calls() {
        let call = correct("GT:DP:GQ:AD", "0/0:30:99:30,0", 2).call.unwrap();
        assert_eq!(call.allele_fraction, None);
        let call = correct("GT:DP:GQ:AD", "1/2:30:99:0,15,15", 3).call.unwrap();
        assert_eq!(call.allele_fraction, None);
        let layout = FormatLayout::from_keys(&keys("GT:DP:GQ:AD")).unwrap();
        let rendered = correct("GT:DP:GQ:AD", "0/0:30:99:30,0", 2)
            .render(&values("0/0:30:99:30,0"), &layout);
        assert_eq!(rendered[1], ".");
    }

    #[test]
    fn existing_af_field_is_replaced() {
        let format = "GT:AF:DP:GQ:AD";
        let layout = FormatLayout::from_keys(&keys(format)).unwrap();
        assert_eq!(
            layout.output_keys(&keys(format)),
            vec!["GT", "AF", "DP", "GQ", "AD"]
        );
        let sample = "0/1:0.9:30:99:20,10";
        let rendered = correct(format, sample, 2).render(&values(sample), &layout);
        assert_eq!(rendered, vec!["0/1", "0.33", "30", "99", "20,10"]);
    }

    #[test]
    fn malformed_genotypes_are_fatal() {
        let layout = FormatLayout::from_keys(&keys("GT:DP:GQ:AD")).unwrap();
        for sample in ["0/x:30:99:20,10", "0/3:30:99:20,10", "0/1/1:30:99:20,10", "0/1:abc:99:1,2"] {
            let err = correct_genotype(&values(sample), &layout, 2, false, &params(), "S1")
                .unwrap_err();
            assert!(
                matches!(err, VcfCleanError::MalformedGenotype { .. }),
                "sample {sample}: {err}"
            );
        }
    }

    #[test]
    fn format_without_leading_gt_is_rejected() {
        assert!(FormatLayout::from_keys(&keys("DP:GT")).is_err());
        assert!(FormatLayout::from_keys(&keys("DP")).is_err());
    }

    #[test]
    fn params_validation_rejects_overlapping_bands() {
        assert!(params().validate().is_ok());
        assert!(params().with(|p| p.max_af_het = 0.95).validate().is_err());
        assert!(params().with(|p| p.min_af_het = 0.8).validate().is_err());
        assert!(params().with(|p| p.min_af = 1.5).validate().is_err());
    }
}
