//! Closed enumerations for scripts and risk flags, stored as TEXT columns.
//!
//! Model output is free-form text, so every enum here resolves through
//! [`resolve`]: the value is upper-cased with spaces/hyphens collapsed to
//! underscores, then matched against the closed set. Anything unresolvable
//! falls back to the enum's defined default instead of failing the page.

macro_rules! closed_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn from_str_exact(value: &str) -> Option<Self> {
                match value {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

closed_enum!(ScriptStatus {
    Processing => "PROCESSING",
    Complete => "COMPLETE",
    Failed => "FAILED",
});

closed_enum!(RiskCategory {
    FactBasedIssues => "FACT_BASED_ISSUES",
    Government => "GOVERNMENT",
    Likeness => "LIKENESS",
    Locations => "LOCATIONS",
    MarketingAddedValue => "MARKETING_ADDED_VALUE",
    MusicChoreography => "MUSIC_CHOREOGRAPHY",
    NamesNumbers => "NAMES_NUMBERS",
    Playback => "PLAYBACK",
    ProductMisuse => "PRODUCT_MISUSE",
    PropsSetDressing => "PROPS_SET_DRESSING",
    References => "REFERENCES",
    Vehicles => "VEHICLES",
    Wardrobe => "WARDROBE",
    Other => "OTHER",
});

closed_enum!(RiskSubCategory {
    RealLifeCharacterPortrayals => "REAL_LIFE_CHARACTER_PORTRAYALS",
    RealLifeIncidentDepictions => "REAL_LIFE_INCIDENT_DEPICTIONS",
    RealLocalesEntitiesLogos => "REAL_LOCALES_ENTITIES_LOGOS",
    BehaviorOfNote => "BEHAVIOR_OF_NOTE",
    Cameos => "CAMEOS",
    CrowdAtmosphereExtras => "CROWD_ATMOSPHERE_EXTRAS",
    NameAndLikenessUse => "NAME_AND_LIKENESS_USE",
    ParodiesSpoofsImitations => "PARODIES_SPOOFS_IMITATIONS",
    AddressesUrlsLicenseNumbers => "ADDRESSES_URLS_LICENSE_NUMBERS",
    NamesBusinessOrgs => "NAMES_BUSINESS_ORGS",
    NamesCharacters => "NAMES_CHARACTERS",
    TelephoneNumbers => "TELEPHONE_NUMBERS",
    AlcoholUse => "ALCOHOL_USE",
    Artwork => "ARTWORK",
    BrandNameProducts => "BRAND_NAME_PRODUCTS",
    LogosGraphics => "LOGOS_GRAPHICS",
    Tobacco => "TOBACCO",
    Toys => "TOYS",
    GovernmentAgenciesSeals => "GOVERNMENT_AGENCIES_SEALS",
    Music => "MUSIC",
    Playback => "PLAYBACK",
    ProductMisuse => "PRODUCT_MISUSE",
    References => "REFERENCES",
    Vehicles => "VEHICLES",
    Wardrobe => "WARDROBE",
    Unknown => "UNKNOWN",
});

closed_enum!(RiskSeverity {
    High => "HIGH",
    Medium => "MEDIUM",
    Low => "LOW",
});

closed_enum!(ClearanceStatus {
    Pending => "PENDING",
    Cleared => "CLEARED",
    NotClear => "NOT_CLEAR",
    NegotiatedByAttorney => "NEGOTIATED_BY_ATTORNEY",
    BrandedIntegration => "BRANDED_INTEGRATION",
    NoClearanceNecessary => "NO_CLEARANCE_NECESSARY",
    Permissible => "PERMISSIBLE",
});

impl RiskSeverity {
    /// Sort rank for reports: HIGH rows first, LOW last.
    pub fn rank(self) -> u8 {
        match self {
            RiskSeverity::High => 0,
            RiskSeverity::Medium => 1,
            RiskSeverity::Low => 2,
        }
    }
}

/// Resolves a model-supplied enum value, falling back to `default` for
/// missing, blank, literal `"null"`, or unrecognized input.
pub fn resolve<T, F>(value: Option<&str>, lookup: F, default: T) -> T
where
    F: Fn(&str) -> Option<T>,
{
    let Some(raw) = value else {
        return default;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return default;
    }
    let normalized = normalize(trimmed);
    lookup(&normalized).unwrap_or(default)
}

fn normalize(value: &str) -> String {
    value
        .to_uppercase()
        .chars()
        .map(|ch| match ch {
            ' ' | '-' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_exact_values() {
        let severity = resolve(
            Some("HIGH"),
            RiskSeverity::from_str_exact,
            RiskSeverity::Medium,
        );
        assert_eq!(severity, RiskSeverity::High);
    }

    #[test]
    fn normalizes_case_spaces_and_hyphens() {
        let status = resolve(
            Some("not-clear"),
            ClearanceStatus::from_str_exact,
            ClearanceStatus::Pending,
        );
        assert_eq!(status, ClearanceStatus::NotClear);

        let category = resolve(
            Some("product misuse"),
            RiskCategory::from_str_exact,
            RiskCategory::Other,
        );
        assert_eq!(category, RiskCategory::ProductMisuse);
    }

    #[test]
    fn unrecognized_severity_defaults_to_medium() {
        let severity = resolve(
            Some("urgent"),
            RiskSeverity::from_str_exact,
            RiskSeverity::Medium,
        );
        assert_eq!(severity, RiskSeverity::Medium);
    }

    #[test]
    fn unrecognized_sub_category_defaults_to_unknown() {
        let sub = resolve(
            Some("miscellaneous"),
            RiskSubCategory::from_str_exact,
            RiskSubCategory::Unknown,
        );
        assert_eq!(sub, RiskSubCategory::Unknown);
    }

    #[test]
    fn null_blank_and_missing_fall_back() {
        for value in [None, Some(""), Some("   "), Some("null"), Some("NULL")] {
            let category = resolve(value, RiskCategory::from_str_exact, RiskCategory::Other);
            assert_eq!(category, RiskCategory::Other);
        }
    }

    #[test]
    fn severity_ranks_order_high_first() {
        assert!(RiskSeverity::High.rank() < RiskSeverity::Medium.rank());
        assert!(RiskSeverity::Medium.rank() < RiskSeverity::Low.rank());
    }
}
