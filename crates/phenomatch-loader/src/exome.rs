//! Exomiser variant TSV reader and per-patient exome store.
//!
//! Exomiser writes one tab-separated row per variant. The header line starts
//! with `#`; the first columns are positional (`CHROM`, `POS`, `REF`, `ALT`,
//! ..., `GENOTYPE` at index 6) and the scoring columns are located by name.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use csv::{ReaderBuilder, StringRecord};
use phenomatch_types::{Variant, Zygosity};

use crate::parser::parse;
use crate::types::{LoadError, LoadResult};

/// Column holding the gene symbol.
pub const GENE_COLUMN: &str = "EXOMISER_GENE";
/// Column holding the combined per-gene score.
pub const GENE_SCORE_COLUMN: &str = "EXOMISER_GENE_COMBINED_SCORE";
/// Column holding the variant effect class.
pub const EFFECT_COLUMN: &str = "FUNCTIONAL_CLASS";
/// Column holding the per-variant score.
pub const VARIANT_SCORE_COLUMN: &str = "EXOMISER_VARIANT_SCORE";

const CHROM_INDEX: usize = 0;
const POS_INDEX: usize = 1;
const REF_INDEX: usize = 2;
const ALT_INDEX: usize = 3;
const GENOTYPE_INDEX: usize = 6;

/// Variant evidence for one gene.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneEvidence {
    /// Gene symbol.
    pub gene: String,
    /// Combined gene score in `[0, 1]`.
    pub score: f64,
    /// Variants in the gene, highest score first.
    pub variants: Vec<Variant>,
}

impl GeneEvidence {
    /// Returns up to `k` allele slots worth of variants, highest score first.
    ///
    /// A homozygous variant occupies two slots but is listed once.
    pub fn top_variants(&self, k: usize) -> Vec<&Variant> {
        let mut slots = 0;
        let mut top = Vec::new();
        for variant in &self.variants {
            if slots >= k {
                break;
            }
            top.push(variant);
            slots += variant.zygosity.allele_count();
        }
        top
    }

    /// Number of allele slots taken by all variants.
    pub fn allele_count(&self) -> usize {
        self.variants.iter().map(|v| v.zygosity.allele_count()).sum()
    }
}

/// Ranked exome annotation results for one patient.
///
/// # Example
///
/// ```
/// use phenomatch_loader::Exome;
/// use phenomatch_types::{Variant, Zygosity};
///
/// let mut exome = Exome::new();
/// exome.add_variant("SRCAP", 0.92, Variant::new("16", 30_748_691, "C", "T", Zygosity::Heterozygous, 0.95, "STOP_GAINED"));
/// exome.add_variant("TTN", 0.40, Variant::new("2", 178_525_989, "G", "A", Zygosity::Homozygous, 0.30, "MISSENSE_VARIANT"));
///
/// assert_eq!(exome.gene_score("SRCAP"), Some(0.92));
/// assert_eq!(exome.top_genes(1)[0].gene, "SRCAP");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exome {
    genes: HashMap<String, GeneEvidence>,
}

impl Exome {
    /// Creates an empty exome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variant to a gene, keeping the gene's variants sorted.
    ///
    /// The gene score is taken from the first variant seen for the gene.
    pub fn add_variant(&mut self, gene: &str, gene_score: f64, variant: Variant) {
        let evidence = self
            .genes
            .entry(gene.to_string())
            .or_insert_with(|| GeneEvidence {
                gene: gene.to_string(),
                score: gene_score,
                variants: Vec::new(),
            });
        let at = evidence
            .variants
            .partition_point(|v| v.score >= variant.score);
        evidence.variants.insert(at, variant);
    }

    /// Combined score of a gene, if the gene has any variants.
    pub fn gene_score(&self, gene: &str) -> Option<f64> {
        self.genes.get(gene).map(|g| g.score)
    }

    /// Evidence for a gene.
    pub fn gene(&self, gene: &str) -> Option<&GeneEvidence> {
        self.genes.get(gene)
    }

    /// Up to `k` variant slots in a gene, highest score first.
    pub fn top_variants(&self, gene: &str, k: usize) -> Vec<&Variant> {
        self.genes
            .get(gene)
            .map(|g| g.top_variants(k))
            .unwrap_or_default()
    }

    /// All genes, highest score first (ties by symbol).
    pub fn genes(&self) -> Vec<&GeneEvidence> {
        let mut genes: Vec<&GeneEvidence> = self.genes.values().collect();
        genes.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.gene.cmp(&b.gene)));
        genes
    }

    /// The `k` highest scoring genes.
    pub fn top_genes(&self, k: usize) -> Vec<&GeneEvidence> {
        let mut genes = self.genes();
        genes.truncate(k);
        genes
    }

    /// Number of genes with variants.
    pub fn gene_count(&self) -> usize {
        self.genes.len()
    }

    /// Number of variants across all genes.
    pub fn variant_count(&self) -> usize {
        self.genes.values().map(|g| g.variants.len()).sum()
    }

    /// Returns true if no variants were loaded.
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// Column positions resolved from an Exomiser header.
#[derive(Debug, Clone)]
struct ExomiserColumns {
    names: Vec<String>,
    gene: usize,
    gene_score: usize,
    effect: usize,
    variant_score: usize,
}

impl ExomiserColumns {
    fn from_header(header: &StringRecord) -> LoadResult<Self> {
        let names: Vec<String> = header
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let name = name.trim();
                if i == 0 {
                    name.trim_start_matches('\u{feff}')
                        .trim_start_matches('#')
                        .to_string()
                } else {
                    name.to_string()
                }
            })
            .collect();

        let find = |column: &str| {
            names
                .iter()
                .position(|n| n == column)
                .ok_or_else(|| LoadError::MissingColumn {
                    column: column.to_string(),
                })
        };

        Ok(Self {
            gene: find(GENE_COLUMN)?,
            gene_score: find(GENE_SCORE_COLUMN)?,
            effect: find(EFFECT_COLUMN)?,
            variant_score: find(VARIANT_SCORE_COLUMN)?,
            names,
        })
    }

    /// Columns already mapped onto `Variant` fields or the gene score.
    fn is_consumed(&self, index: usize) -> bool {
        matches!(index, CHROM_INDEX | POS_INDEX | REF_INDEX | ALT_INDEX | GENOTYPE_INDEX)
            || [self.gene, self.gene_score, self.effect, self.variant_score].contains(&index)
    }

    fn parse_row(&self, record: &StringRecord) -> LoadResult<(String, f64, Variant)> {
        let field = |i: usize| record.get(i).unwrap_or("").trim();

        let gene = field(self.gene).to_string();
        if gene.is_empty() {
            return Err(LoadError::Parse("variant without gene".to_string()));
        }
        let gene_score = parse::score(field(self.gene_score))?;

        let mut variant = Variant::new(
            field(CHROM_INDEX),
            parse::position(field(POS_INDEX))?,
            field(REF_INDEX),
            field(ALT_INDEX),
            Zygosity::from_genotype(field(GENOTYPE_INDEX)),
            parse::score(field(self.variant_score))?,
            field(self.effect),
        );

        let mut annotations = BTreeMap::new();
        for (i, name) in self.names.iter().enumerate() {
            if self.is_consumed(i) {
                continue;
            }
            if let Some(value) = record.get(i) {
                annotations.insert(name.clone(), value.trim().to_string());
            }
        }
        variant.annotations = annotations;

        Ok((gene, gene_score, variant))
    }
}

/// Reads an Exomiser variant TSV into an [`Exome`].
///
/// Malformed rows are skipped and logged; a header missing a scoring column is an error.
pub fn read_exomiser<R: Read>(reader: R) -> LoadResult<Exome> {
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(reader);

    let mut records = csv_reader.records();
    let header = match records.next() {
        Some(header) => header?,
        None => return Ok(Exome::new()),
    };
    let columns = ExomiserColumns::from_header(&header)?;

    let mut exome = Exome::new();
    let mut skipped = 0usize;
    for record in records {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        match columns.parse_row(&record) {
            Ok((gene, gene_score, variant)) => exome.add_variant(&gene, gene_score, variant),
            Err(e) => {
                skipped += 1;
                tracing::debug!("Skipping exome row: {}", e);
            }
        }
    }
    if skipped > 0 {
        tracing::warn!("Skipped {} malformed exome rows", skipped);
    }

    Ok(exome)
}

/// Reads an Exomiser variant TSV file.
pub fn read_exomiser_path<P: AsRef<Path>>(path: P) -> LoadResult<Exome> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    read_exomiser(BufReader::new(File::open(path)?))
}

/// Exome results stored as `<root>/<patientId>/<patientId>.variants.tsv`.
///
/// Parsed exomes are cached until invalidated.
pub struct FileSystemExomeStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<Exome>>>,
}

impl std::fmt::Debug for FileSystemExomeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.cache.read().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("FileSystemExomeStore")
            .field("root", &self.root)
            .field("cached", &cached)
            .finish()
    }
}

impl FileSystemExomeStore {
    /// Creates a store rooted at a directory.
    pub fn new<P: AsRef<Path>>(root: P) -> LoadResult<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(LoadError::DirectoryNotFound {
                path: root.display().to_string(),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Path where a patient's results are expected.
    ///
    /// Returns `None` for ids that could escape the root directory.
    pub fn exome_path(&self, patient_id: &str) -> Option<PathBuf> {
        if patient_id.is_empty()
            || patient_id.contains('/')
            || patient_id.contains('\\')
            || patient_id.contains("..")
        {
            return None;
        }
        Some(
            self.root
                .join(patient_id)
                .join(format!("{}.variants.tsv", patient_id)),
        )
    }

    /// Returns true if a results file exists for the patient.
    pub fn has_exome(&self, patient_id: &str) -> bool {
        self.exome_path(patient_id).is_some_and(|p| p.is_file())
    }

    /// Loads a patient's exome. Missing or unreadable files yield `None`.
    pub fn get_exome(&self, patient_id: &str) -> Option<Arc<Exome>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(exome) = cache.get(patient_id) {
                return Some(Arc::clone(exome));
            }
        }

        let path = self.exome_path(patient_id)?;
        if !path.is_file() {
            return None;
        }
        match read_exomiser_path(&path) {
            Ok(exome) => {
                let exome = Arc::new(exome);
                if let Ok(mut cache) = self.cache.write() {
                    cache.insert(patient_id.to_string(), Arc::clone(&exome));
                }
                Some(exome)
            }
            Err(e) => {
                tracing::warn!("Could not read exome for {}: {}", patient_id, e);
                None
            }
        }
    }

    /// Drops a cached exome so the next read goes to disk.
    pub fn invalidate(&self, patient_id: &str) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(patient_id);
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
