use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Countries with profile presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Country {
    #[serde(rename = "Canada")]
    Canada,
    #[serde(rename = "United States")]
    UnitedStates,
    #[serde(rename = "India")]
    India,
}

/// A selectable tax system for a country
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaxOption {
    pub value: &'static str,
    pub description: &'static str,
}

const CANADA_TAX: &[TaxOption] = &[
    TaxOption { value: "GST", description: "Goods and Services Tax (5%)" },
    TaxOption { value: "HST", description: "Harmonized Sales Tax (ON, NB, NS, NL, PEI)" },
    TaxOption { value: "GST + PST", description: "GST + Provincial Sales Tax (BC, SK, MB, QC)" },
    TaxOption { value: "GST + QST", description: "GST + Quebec Sales Tax (QC only)" },
];

const US_TAX: &[TaxOption] = &[
    TaxOption { value: "Sales Tax", description: "State and local sales tax" },
    TaxOption { value: "No Tax", description: "No sales tax (OR, MT, NH, DE, AK)" },
];

const INDIA_TAX: &[TaxOption] = &[
    TaxOption { value: "GST", description: "Goods and Services Tax" },
    TaxOption { value: "IGST", description: "Integrated GST for inter-state transactions" },
    TaxOption { value: "CGST + SGST", description: "Central + State GST for intra-state transactions" },
];

impl Country {
    pub const ALL: [Country; 3] = [Country::Canada, Country::UnitedStates, Country::India];

    pub fn name(&self) -> &'static str {
        match self {
            Country::Canada => "Canada",
            Country::UnitedStates => "United States",
            Country::India => "India",
        }
    }

    pub fn currency(&self) -> &'static str {
        match self {
            Country::Canada => "CAD",
            Country::UnitedStates => "USD",
            Country::India => "INR",
        }
    }

    pub fn default_tax_system(&self) -> &'static str {
        self.tax_options()[0].value
    }

    pub fn tax_options(&self) -> &'static [TaxOption] {
        match self {
            Country::Canada => CANADA_TAX,
            Country::UnitedStates => US_TAX,
            Country::India => INDIA_TAX,
        }
    }

    pub fn supports_tax_system(&self, tax_system: &str) -> bool {
        self.tax_options().iter().any(|o| o.value == tax_system)
    }
}

impl FromStr for Country {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Country::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AppError::InvalidInput(format!("Unsupported country: {}", s)))
    }
}

impl Display for Country {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// Profile of a registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub country: Country,
    pub currency: String,
    pub tax_system: String,
}

impl UserProfile {
    /// Build a profile with the country's currency and default tax system.
    ///
    /// The username is stored lowercased; names and email are trimmed.
    pub fn with_country_defaults(
        id: Uuid,
        username: &str,
        first_name: &str,
        last_name: &str,
        email: &str,
        country: Country,
    ) -> Self {
        Self {
            id,
            username: username.to_lowercase(),
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            email: email.trim().to_string(),
            country,
            currency: country.currency().to_string(),
            tax_system: country.default_tax_system().to_string(),
        }
    }

    /// Switch country, resetting currency and tax system to its presets.
    pub fn set_country(&mut self, country: Country) {
        self.country = country;
        self.currency = country.currency().to_string();
        self.tax_system = country.default_tax_system().to_string();
    }

    pub fn set_tax_system(&mut self, tax_system: &str) -> Result<(), AppError> {
        if !self.country.supports_tax_system(tax_system) {
            return Err(AppError::InvalidInput(format!(
                "{} is not a tax system for {}",
                tax_system, self.country
            )));
        }
        self.tax_system = tax_system.to_string();
        Ok(())
    }
}
