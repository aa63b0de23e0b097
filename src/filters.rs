use serde::{Deserialize, Serialize};

/// Sidebar filters. An empty list selects everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    pub sites: Vec<String>,
    pub companies: Vec<String>,
    pub years: Vec<i32>,
    pub months: Vec<u32>,
    pub organik: bool,
    pub anorganik: bool,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            sites: Vec::new(),
            companies: Vec::new(),
            years: Vec::new(),
            months: Vec::new(),
            organik: true,
            anorganik: true,
        }
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "ya")
}

impl Filters {
    /// Parses `site=A&site=B&perusahaan=X&tahun=2024&bulan=3&organik=0`.
    /// `bulan` takes a month number or an Indonesian month name.
    pub fn from_query(query: &str) -> Self {
        let mut f = Filters::default();
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            let v = v.trim().to_string();
            if v.is_empty() {
                continue;
            }
            match k.as_ref() {
                "site" => f.sites.push(v),
                "perusahaan" => f.companies.push(v),
                "tahun" => f.years.extend(v.parse::<i32>().ok()),
                "bulan" => f
                    .months
                    .extend(v.parse::<u32>().ok().or_else(|| crate::program::month_number(&v))),
                "organik" => f.organik = parse_bool(&v),
                "anorganik" => f.anorganik = parse_bool(&v),
                _ => {}
            }
        }
        f
    }

    pub fn site_ok(&self, site: &str) -> bool {
        self.sites.is_empty() || self.sites.iter().any(|s| s == site)
    }

    pub fn company_ok(&self, company: &str) -> bool {
        self.companies.is_empty() || self.companies.iter().any(|c| c == company)
    }

    pub fn site_company_ok(&self, site: &str, company: &str) -> bool {
        self.site_ok(site) && self.company_ok(company)
    }

    /// A row without a year is dropped once any year is selected.
    pub fn year_ok(&self, year: Option<i32>) -> bool {
        self.years.is_empty() || year.map_or(false, |y| self.years.contains(&y))
    }

    pub fn month_ok(&self, month: u32) -> bool {
        self.months.is_empty() || self.months.contains(&month)
    }

    /// Organik/anorganik toggles; other waste classes pass only when both
    /// toggles are on.
    pub fn waste_class_ok(&self, jenis_sampah: &str) -> bool {
        match (self.organik, self.anorganik) {
            (true, true) => true,
            (true, false) => jenis_sampah == "Organik",
            (false, true) => jenis_sampah == "Anorganik",
            (false, false) => false,
        }
    }
}
