//! Access-tier views over a similarity result.
//!
//! A [`RedactedView`] is built once per (result, tier) by [`redact`]. The
//! limited variant copies only what may be shown, so nothing that exists
//! solely on the concealed matched record can reach its JSON.
//!
//! | Field            | Open | Limited                       | Private |
//! |------------------|------|-------------------------------|---------|
//! | id, owner        | yes  | no                            | no      |
//! | score, count     | yes  | yes                           | no      |
//! | match term ids   | yes  | `""` placeholders             | no      |
//! | disorders        | yes  | no                            | no      |
//! | match variants   | full | score and effect              | no      |

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use phenomatch_loader::OntologyStore;
use phenomatch_types::{AccessTier, Feature, TermId, Variant};

use crate::genotype::{variant_json, variants_object};
use crate::phenotype::{FeatureCluster, UNMATCHED};
use crate::similarity::SimilarityResult;

/// What a viewer with limited access may see of one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitedCluster {
    /// Category id shown, possibly promoted above the real ancestor; empty when unmatched.
    pub category_id: String,
    /// Category name shown.
    pub category_name: String,
    /// Cluster score.
    pub score: f64,
    /// Reference terms, shown verbatim.
    pub reference: Vec<TermId>,
    /// Number of hidden match terms.
    pub hidden_matches: usize,
}

/// Score and effect of a concealed variant.
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictedVariant {
    /// Harmfulness score.
    pub score: f64,
    /// Effect class.
    pub effect: String,
}

impl From<&Variant> for RestrictedVariant {
    fn from(variant: &Variant) -> Self {
        Self {
            score: variant.score,
            effect: variant.effect.clone(),
        }
    }
}

/// What a viewer with limited access may see of one shared gene.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitedGene {
    /// Gene symbol.
    pub gene: String,
    /// Pairwise gene score.
    pub score: f64,
    /// Reference variants, full detail.
    pub reference_variants: Vec<Variant>,
    /// Matched variants, reduced.
    pub match_variants: Vec<RestrictedVariant>,
}

/// Limited-tier content. Holds no reference to the matched patient record.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitedView {
    my_case: bool,
    score: f64,
    phenotype_score: f64,
    genotype_score: f64,
    features_count: usize,
    features: Vec<(TermId, String)>,
    clusters: Vec<LimitedCluster>,
    genes: Vec<LimitedGene>,
}

/// A similarity result as disclosed to one viewer.
#[derive(Debug, Clone)]
pub enum RedactedView {
    /// Full disclosure.
    Open(Arc<SimilarityResult>),
    /// Reference side shown, matched side reduced to counts and placeholders.
    Limited(LimitedView),
    /// Nothing disclosed.
    Private,
}

/// Builds the view of a result for an access tier.
pub fn redact(result: &Arc<SimilarityResult>, tier: AccessTier, store: &OntologyStore) -> RedactedView {
    match tier {
        AccessTier::Open => RedactedView::Open(Arc::clone(result)),
        AccessTier::Limited => RedactedView::Limited(limited_view(result, store)),
        AccessTier::Private => RedactedView::Private,
    }
}

fn limited_view(result: &SimilarityResult, store: &OntologyStore) -> LimitedView {
    let clusters: Vec<LimitedCluster> = result
        .phenotype
        .clusters
        .iter()
        .map(|c| limited_cluster(c, store))
        .collect();

    let features: Vec<(TermId, String)> = result
        .phenotype
        .clusters
        .iter()
        .filter(|c| !c.is_unmatched())
        .flat_map(|c| c.reference.iter())
        .map(|t| (t.clone(), store.name(t).unwrap_or_default().to_string()))
        .collect();

    let genes = result
        .genotype
        .genes
        .iter()
        .map(|g| LimitedGene {
            gene: g.gene.clone(),
            score: g.score,
            reference_variants: g.reference_variants.clone(),
            match_variants: g.match_variants.iter().map(RestrictedVariant::from).collect(),
        })
        .collect();

    LimitedView {
        my_case: result.my_case(),
        score: result.score(),
        phenotype_score: result.phenotype_score(),
        genotype_score: result.genotype_score(),
        features_count: result.features_count(),
        features,
        clusters,
        genes,
    }
}

/// Chooses the category shown for a cluster whose match terms are hidden.
///
/// The ancestor is replaced by its lowest-id parent for as long as it equals a
/// hidden match term or the cluster's only reference term. This is a
/// heuristic: it avoids the obvious disclosures, not every inference.
fn limited_cluster(cluster: &FeatureCluster, store: &OntologyStore) -> LimitedCluster {
    let hidden: BTreeSet<&str> = cluster.matched.iter().map(String::as_str).collect();
    let lone_reference = match cluster.reference.as_slice() {
        [only] => Some(only.as_str()),
        _ => None,
    };
    let must_promote = |term: &str| hidden.contains(term) || lone_reference == Some(term);

    let (category_id, category_name) = match cluster.ancestor.as_deref() {
        None => (String::new(), UNMATCHED.to_string()),
        Some(ancestor) => {
            let mut category = ancestor;
            while must_promote(category) {
                match store.lowest_parent(category) {
                    Some(parent) => category = parent,
                    None => break,
                }
            }
            if hidden.contains(category) {
                (String::new(), UNMATCHED.to_string())
            } else {
                (
                    category.to_string(),
                    store.name(category).unwrap_or_default().to_string(),
                )
            }
        }
    };

    LimitedCluster {
        category_id,
        category_name,
        score: cluster.score,
        reference: cluster.reference.clone(),
        hidden_matches: cluster.matched.len(),
    }
}

fn feature_json(id: &str, name: &str) -> Value {
    json!({ "id": id, "name": name, "observed": "yes" })
}

fn put_array(object: &mut Map<String, Value>, key: &str, items: Vec<Value>) {
    if !items.is_empty() {
        object.insert(key.to_string(), Value::Array(items));
    }
}

impl RedactedView {
    /// Access tier this view was built for.
    pub fn tier(&self) -> AccessTier {
        match self {
            Self::Open(_) => AccessTier::Open,
            Self::Limited(_) => AccessTier::Limited,
            Self::Private => AccessTier::Private,
        }
    }

    /// Overall score, 0 when private.
    pub fn score(&self) -> f64 {
        match self {
            Self::Open(result) => result.score(),
            Self::Limited(view) => view.score,
            Self::Private => 0.0,
        }
    }

    /// Phenotype score, 0 when private.
    pub fn phenotype_score(&self) -> f64 {
        match self {
            Self::Open(result) => result.phenotype_score(),
            Self::Limited(view) => view.phenotype_score,
            Self::Private => 0.0,
        }
    }

    /// Genotype score, 0 when private.
    pub fn genotype_score(&self) -> f64 {
        match self {
            Self::Open(result) => result.genotype_score(),
            Self::Limited(view) => view.genotype_score,
            Self::Private => 0.0,
        }
    }

    /// Matched patient id, only disclosed in the open view.
    pub fn matched_id(&self) -> Option<&str> {
        match self {
            Self::Open(result) => Some(result.matched_id()),
            _ => None,
        }
    }

    /// Serializes the view. Empty lists are omitted; private views are `{}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Private => Value::Object(Map::new()),
            Self::Open(result) => open_json(result),
            Self::Limited(view) => limited_json(view),
        }
    }
}

fn open_json(result: &SimilarityResult) -> Value {
    let matched = &result.matched;
    let mut object = Map::new();
    object.insert("id".into(), json!(matched.id));
    if let Some(owner) = &matched.reporter {
        object.insert("owner".into(), json!(owner));
    }
    object.insert("access".into(), json!(AccessTier::Open.name()));
    object.insert("myCase".into(), json!(result.my_case()));
    object.insert("score".into(), json!(result.score()));
    object.insert("featuresCount".into(), json!(result.features_count()));

    put_array(
        &mut object,
        "features",
        matched
            .present_features()
            .map(|f: &Feature| feature_json(&f.id, &f.name))
            .collect(),
    );
    put_array(
        &mut object,
        "featureMatches",
        result.phenotype.clusters.iter().map(FeatureCluster::to_json).collect(),
    );
    put_array(
        &mut object,
        "disorders",
        matched
            .disorders
            .iter()
            .map(|d| json!({ "id": d.id, "name": d.name }))
            .collect(),
    );
    put_array(
        &mut object,
        "genes",
        result
            .genotype
            .genes
            .iter()
            .map(|g| {
                json!({
                    "gene": g.gene,
                    "score": g.score,
                    "reference": variants_object(&g.reference_variants, variant_json),
                    "match": variants_object(&g.match_variants, variant_json),
                })
            })
            .collect(),
    );

    Value::Object(object)
}

fn limited_json(view: &LimitedView) -> Value {
    let mut object = Map::new();
    object.insert("access".into(), json!(AccessTier::Limited.name()));
    object.insert("myCase".into(), json!(view.my_case));
    object.insert("score".into(), json!(view.score));
    object.insert("featuresCount".into(), json!(view.features_count));

    put_array(
        &mut object,
        "features",
        view.features
            .iter()
            .map(|(id, name)| feature_json(id, name))
            .collect(),
    );
    put_array(
        &mut object,
        "featureMatches",
        view.clusters
            .iter()
            .map(|c| {
                json!({
                    "score": c.score,
                    "category": {
                        "id": (!c.category_id.is_empty()).then_some(&c.category_id),
                        "name": c.category_name,
                    },
                    "reference": c.reference,
                    "match": vec![""; c.hidden_matches],
                })
            })
            .collect(),
    );
    put_array(
        &mut object,
        "genes",
        view.genes
            .iter()
            .map(|g| {
                let restricted: Vec<Value> = g.match_variants.iter().map(restricted_json).collect();
                let mut matched = Map::new();
                if !restricted.is_empty() {
                    matched.insert("variants".into(), Value::Array(restricted));
                }
                json!({
                    "gene": g.gene,
                    "score": g.score,
                    "reference": variants_object(&g.reference_variants, variant_json),
                    "match": Value::Object(matched),
                })
            })
            .collect(),
    );

    Value::Object(object)
}

impl LimitedView {
    /// Clusters as shown to the viewer.
    pub fn clusters(&self) -> &[LimitedCluster] {
        &self.clusters
    }

    /// Genes as shown to the viewer.
    pub fn genes(&self) -> &[LimitedGene] {
        &self.genes
    }
}

/// Restricted variant JSON from an already reduced variant.
pub fn restricted_json(variant: &RestrictedVariant) -> Value {
    json!({ "score": variant.score, "effect": variant.effect })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype::restricted_variant_json;
    use crate::similarity::tests::{context_for, patient};
    use phenomatch_loader::Exome;
    use phenomatch_types::{Disorder, Zygosity};

    fn sample_result() -> Arc<SimilarityResult> {
        let reference = patient("P0000001", "alice", &["HP:0000518", "HP:0001371"], &["SRCAP"]);
        let mut matched = patient("P0000002", "bob", &["HP:0010696", "HP:0001382"], &["SRCAP"]);
        matched.disorders = vec![Disorder::new("OMIM:614576", "Floating-Harbor syndrome")];
        let (context, _) = context_for(vec![reference.clone(), matched.clone()]);
        Arc::new(context.score(&Arc::new(matched), &Arc::new(reference)))
    }

    fn store() -> OntologyStore {
        crate::phenotype::tests::sample_model().store().clone()
    }

    #[test]
    fn test_private_view_is_empty() {
        let view = redact(&sample_result(), AccessTier::Private, &store());
        assert_eq!(view.to_json(), json!({}));
        assert_eq!(view.score(), 0.0);
        assert_eq!(view.phenotype_score(), 0.0);
        assert_eq!(view.genotype_score(), 0.0);
        assert!(view.matched_id().is_none());
    }

    #[test]
    fn test_open_view_discloses_everything() {
        let result = sample_result();
        let view = redact(&result, AccessTier::Open, &store());
        let json = view.to_json();

        assert_eq!(json["id"], "P0000002");
        assert_eq!(json["owner"], "bob");
        assert_eq!(json["access"], "open");
        assert_eq!(json["featuresCount"], 2);
        assert_eq!(json["disorders"][0]["id"], "OMIM:614576");
        assert_eq!(json["featureMatches"][0]["match"][0], "HP:0010696");
        assert_eq!(json["genes"][0]["gene"], "SRCAP");
        assert_eq!(view.score(), result.score());
    }

    #[test]
    fn test_limited_view_hides_match_terms() {
        let result = sample_result();
        let view = redact(&result, AccessTier::Limited, &store());
        let json = view.to_json();
        let text = json.to_string();

        for hidden in ["HP:0010696", "HP:0001382", "P0000002", "bob", "OMIM:614576"] {
            assert!(!text.contains(hidden), "limited view leaked {}", hidden);
        }
        assert!(json.get("id").is_none());
        assert!(json.get("owner").is_none());
        assert!(json.get("disorders").is_none());
        assert_eq!(json["featuresCount"], 2);
        assert_eq!(json["featureMatches"][0]["match"], json!([""]));
        assert_eq!(json["featureMatches"][0]["reference"], json!(["HP:0000518"]));
        assert_eq!(view.score(), result.score());
    }

    #[test]
    fn test_limited_view_promotes_category() {
        let result = sample_result();
        let RedactedView::Limited(view) = redact(&result, AccessTier::Limited, &store()) else {
            panic!("expected limited view");
        };
        // Cataract is the lone reference term, so the lens category is shown instead
        assert_eq!(view.clusters()[0].category_id, "HP:0000517");
        assert_eq!(view.clusters()[0].category_name, "Abnormality of the lens");
    }

    #[test]
    fn test_limited_view_promotes_past_hidden_term() {
        let store = store();
        let cluster = FeatureCluster {
            ancestor: Some("HP:0000518".to_string()),
            name: "Cataract".to_string(),
            score: 0.6,
            reference: vec!["HP:0010696".to_string(), "HP:0000518".to_string()],
            matched: vec!["HP:0000518".to_string()],
        };
        let limited = limited_cluster(&cluster, &store);
        assert_eq!(limited.category_id, "HP:0000517");
        assert_eq!(limited.hidden_matches, 1);
    }

    #[test]
    fn test_limited_variants_reduced() {
        let mut exome = Exome::new();
        exome.add_variant(
            "SRCAP",
            0.9,
            Variant::new("16", 30_748_691, "C", "T", Zygosity::Heterozygous, 0.95, "STOP_GAINED"),
        );
        let variant = exome.top_variants("SRCAP", 1)[0].clone();
        let restricted = RestrictedVariant::from(&variant);
        let json = restricted_json(&restricted);
        assert_eq!(json, restricted_variant_json(&variant));
        assert!(json.get("start").is_none());
    }
}
