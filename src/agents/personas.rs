//! Crowd persona catalog.
//!
//! Twenty archetype templates, five each of political spectrum,
//! professional background, demographic/experiential, and stakeholder
//! group, cycled to reach the configured crowd size so the distribution
//! stays even at any N.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub description: String,
}

struct Template {
    kind: &'static str,
    name: &'static str,
    description: &'static str,
}

const TEMPLATES: [Template; 20] = [
    // Political spectrum
    Template {
        kind: "political",
        name: "Progressive Activist",
        description: "Strong advocate for social justice and government intervention",
    },
    Template {
        kind: "political",
        name: "Fiscal Conservative",
        description: "Prioritizes low taxes, limited government, free markets",
    },
    Template {
        kind: "political",
        name: "Libertarian",
        description: "Values individual freedom and minimal government",
    },
    Template {
        kind: "political",
        name: "Social Democrat",
        description: "Supports mixed economy and social safety net",
    },
    Template {
        kind: "political",
        name: "Moderate Independent",
        description: "Pragmatic centrist, case-by-case evaluation",
    },
    // Professional backgrounds
    Template {
        kind: "professional",
        name: "Economist",
        description: "PhD economist focused on data and empirical evidence",
    },
    Template {
        kind: "professional",
        name: "Small Business Owner",
        description: "Practical perspective on business and employment",
    },
    Template {
        kind: "professional",
        name: "Social Worker",
        description: "Front-line experience with poverty and social programs",
    },
    Template {
        kind: "professional",
        name: "Tech Entrepreneur",
        description: "Innovation-focused, disruption-oriented thinking",
    },
    Template {
        kind: "professional",
        name: "Public School Teacher",
        description: "Education and community welfare perspective",
    },
    // Demographic / experiential
    Template {
        kind: "demographic",
        name: "Working Class Parent",
        description: "Struggles with bills, childcare, job security",
    },
    Template {
        kind: "demographic",
        name: "Retired Senior",
        description: "Fixed income, healthcare concerns, traditional values",
    },
    Template {
        kind: "demographic",
        name: "College Student",
        description: "Young, idealistic, concerned about future opportunities",
    },
    Template {
        kind: "demographic",
        name: "Rural Resident",
        description: "Small town perspective, self-reliance values",
    },
    Template {
        kind: "demographic",
        name: "Urban Professional",
        description: "City dweller, cosmopolitan, career-focused",
    },
    // Stakeholder groups
    Template {
        kind: "stakeholder",
        name: "Healthcare Worker",
        description: "Insider view of healthcare system challenges",
    },
    Template {
        kind: "stakeholder",
        name: "Environmental Advocate",
        description: "Climate and sustainability priority",
    },
    Template {
        kind: "stakeholder",
        name: "Union Representative",
        description: "Worker rights and collective bargaining focus",
    },
    Template {
        kind: "stakeholder",
        name: "Corporate Executive",
        description: "Business efficiency and shareholder value perspective",
    },
    Template {
        kind: "stakeholder",
        name: "Nonprofit Director",
        description: "Mission-driven, community impact focused",
    },
];

/// Build `count` personas by cycling the archetype catalog.
pub fn build_personas(count: usize) -> Vec<Persona> {
    (0..count)
        .map(|i| {
            let template = &TEMPLATES[i % TEMPLATES.len()];
            Persona {
                id: format!("v_{:03}", i + 1),
                name: format!("{} #{}", template.name, i / TEMPLATES.len() + 1),
                kind: template.kind.to_string(),
                description: template.description.to_string(),
            }
        })
        .collect()
}

/// Persona counts by archetype kind, for `status` output.
pub fn distribution(personas: &[Persona]) -> BTreeMap<String, usize> {
    let mut by_kind = BTreeMap::new();
    for persona in personas {
        *by_kind.entry(persona.kind.clone()).or_insert(0) += 1;
    }
    by_kind
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_twenty_across_four_kinds() {
        let personas = build_personas(20);
        let dist = distribution(&personas);
        assert_eq!(dist.len(), 4);
        for count in dist.values() {
            assert_eq!(*count, 5);
        }
    }

    #[test]
    fn test_cycling_keeps_distribution_even() {
        let personas = build_personas(100);
        let dist = distribution(&personas);
        for count in dist.values() {
            assert_eq!(*count, 25);
        }
    }

    #[test]
    fn test_ids_stable_and_padded() {
        let personas = build_personas(10);
        assert_eq!(personas[0].id, "v_001");
        assert_eq!(personas[9].id, "v_010");
    }

    #[test]
    fn test_generation_suffix_increments_per_cycle() {
        let personas = build_personas(45);
        assert!(personas[0].name.ends_with("#1"));
        assert!(personas[20].name.ends_with("#2"));
        assert!(personas[40].name.ends_with("#3"));
    }

    #[test]
    fn test_small_crowd_takes_catalog_prefix() {
        let personas = build_personas(3);
        assert_eq!(personas[0].name, "Progressive Activist #1");
        assert_eq!(personas[2].name, "Libertarian #1");
    }
}
