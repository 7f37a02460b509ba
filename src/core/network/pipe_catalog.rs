use crate::core::units::MILLIMETRES_IN_METRE;
use anyhow::bail;
use std::f64::consts::PI;

/// Standard pipe type, e.g. a plastic-jacketed steel pipe "KMR 100/225-2v".
#[derive(Clone, Debug, PartialEq)]
pub struct PipeType {
    pub name: &'static str,
    pub material: &'static str,
    pub insulation: &'static str,
    pub inner_diameter_mm: f64,
    pub roughness_mm: f64,
    /// heat loss per metre of pipe and K of temperature difference to the ground, W/(m K)
    pub heat_loss_per_metre: f64,
}

impl PipeType {
    /// Heat transfer coefficient related to the inner pipe surface, W/(m2 K)
    pub fn heat_transfer_coefficient(&self) -> f64 {
        self.heat_loss_per_metre / (PI * self.inner_diameter_mm / MILLIMETRES_IN_METRE as f64)
    }
}

macro_rules! pipe_type {
    ($name:literal, $material:literal, $insulation:literal, $diameter:expr, $roughness:expr, $loss:expr) => {
        PipeType {
            name: $name,
            material: $material,
            insulation: $insulation,
            inner_diameter_mm: $diameter,
            roughness_mm: $roughness,
            heat_loss_per_metre: $loss,
        }
    };
}

static STANDARD_TYPES: [PipeType; 42] = [
    pipe_type!("KMR 20/90-1v", "KMR", "1v", 21.7, 0.1, 0.128),
    pipe_type!("KMR 25/90-1v", "KMR", "1v", 28.5, 0.1, 0.150),
    pipe_type!("KMR 32/110-1v", "KMR", "1v", 37.2, 0.1, 0.155),
    pipe_type!("KMR 40/110-1v", "KMR", "1v", 43.1, 0.1, 0.178),
    pipe_type!("KMR 50/125-1v", "KMR", "1v", 54.5, 0.1, 0.190),
    pipe_type!("KMR 65/140-1v", "KMR", "1v", 70.3, 0.1, 0.222),
    pipe_type!("KMR 80/160-1v", "KMR", "1v", 82.5, 0.1, 0.229),
    pipe_type!("KMR 100/200-1v", "KMR", "1v", 107.1, 0.1, 0.232),
    pipe_type!("KMR 125/225-1v", "KMR", "1v", 132.5, 0.1, 0.268),
    pipe_type!("KMR 150/250-1v", "KMR", "1v", 160.3, 0.1, 0.306),
    pipe_type!("KMR 200/315-1v", "KMR", "1v", 210.1, 0.1, 0.330),
    pipe_type!("KMR 250/400-1v", "KMR", "1v", 263.0, 0.1, 0.320),
    pipe_type!("KMR 300/450-1v", "KMR", "1v", 312.7, 0.1, 0.368),
    pipe_type!("KMR 20/110-2v", "KMR", "2v", 21.7, 0.1, 0.109),
    pipe_type!("KMR 25/110-2v", "KMR", "2v", 28.5, 0.1, 0.124),
    pipe_type!("KMR 32/125-2v", "KMR", "2v", 37.2, 0.1, 0.135),
    pipe_type!("KMR 40/125-2v", "KMR", "2v", 43.1, 0.1, 0.154),
    pipe_type!("KMR 50/140-2v", "KMR", "2v", 54.5, 0.1, 0.164),
    pipe_type!("KMR 65/160-2v", "KMR", "2v", 70.3, 0.1, 0.182),
    pipe_type!("KMR 80/180-2v", "KMR", "2v", 82.5, 0.1, 0.193),
    pipe_type!("KMR 100/225-2v", "KMR", "2v", 107.1, 0.1, 0.197),
    pipe_type!("KMR 125/250-2v", "KMR", "2v", 132.5, 0.1, 0.226),
    pipe_type!("KMR 150/280-2v", "KMR", "2v", 160.3, 0.1, 0.248),
    pipe_type!("KMR 200/355-2v", "KMR", "2v", 210.1, 0.1, 0.265),
    pipe_type!("KMR 250/450-2v", "KMR", "2v", 263.0, 0.1, 0.263),
    pipe_type!("KMR 300/500-2v", "KMR", "2v", 312.7, 0.1, 0.304),
    pipe_type!("FL 25/91-1v", "FL", "1v", 20.4, 0.007, 0.126),
    pipe_type!("FL 32/91-1v", "FL", "1v", 26.2, 0.007, 0.148),
    pipe_type!("FL 40/126-1v", "FL", "1v", 32.6, 0.007, 0.146),
    pipe_type!("FL 50/126-1v", "FL", "1v", 40.8, 0.007, 0.170),
    pipe_type!("FL 63/142-1v", "FL", "1v", 51.4, 0.007, 0.189),
    pipe_type!("FL 75/162-1v", "FL", "1v", 61.4, 0.007, 0.199),
    pipe_type!("FL 90/182-1v", "FL", "1v", 73.6, 0.007, 0.216),
    pipe_type!("FL 110/202-1v", "FL", "1v", 90.0, 0.007, 0.250),
    pipe_type!("FL 25/111-2v", "FL", "2v", 20.4, 0.007, 0.108),
    pipe_type!("FL 32/111-2v", "FL", "2v", 26.2, 0.007, 0.124),
    pipe_type!("FL 40/142-2v", "FL", "2v", 32.6, 0.007, 0.126),
    pipe_type!("FL 50/142-2v", "FL", "2v", 40.8, 0.007, 0.144),
    pipe_type!("FL 63/162-2v", "FL", "2v", 51.4, 0.007, 0.158),
    pipe_type!("FL 75/182-2v", "FL", "2v", 61.4, 0.007, 0.168),
    pipe_type!("FL 90/202-2v", "FL", "2v", 73.6, 0.007, 0.183),
    pipe_type!("FL 110/250-2v", "FL", "2v", 90.0, 0.007, 0.192),
];

/// Standard pipe types of one material and insulation class, ordered by inner diameter.
#[derive(Clone, Debug)]
pub struct PipeCatalog {
    types: Vec<&'static PipeType>,
}

impl PipeCatalog {
    pub fn filtered(material: &str, insulation: &str) -> anyhow::Result<Self> {
        let mut types = STANDARD_TYPES
            .iter()
            .filter(|t| t.material == material && t.insulation == insulation)
            .collect::<Vec<_>>();
        if types.is_empty() {
            bail!("No standard pipe types for material '{material}' with insulation '{insulation}'");
        }
        types.sort_by(|a, b| a.inner_diameter_mm.total_cmp(&b.inner_diameter_mm));

        Ok(Self { types })
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&'static PipeType> {
        self.types.get(position).copied()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.types.iter().position(|t| t.name == name)
    }

    /// Position of the type whose inner diameter is closest to `diameter_m`.
    pub fn closest(&self, diameter_m: f64) -> usize {
        let diameter_mm = diameter_m * MILLIMETRES_IN_METRE as f64;
        self.types
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (a.inner_diameter_mm - diameter_mm)
                    .abs()
                    .total_cmp(&(b.inner_diameter_mm - diameter_mm).abs())
            })
            .map(|(position, _)| position)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    #[case("KMR", "2v", 13)]
    #[case("KMR", "1v", 13)]
    #[case("FL", "1v", 8)]
    fn should_filter_by_material_and_insulation(
        #[case] material: &str,
        #[case] insulation: &str,
        #[case] expected: usize,
    ) {
        let catalog = PipeCatalog::filtered(material, insulation).unwrap();

        assert_eq!(catalog.len(), expected);
        assert!((1..catalog.len()).all(|i| {
            catalog.get(i - 1).unwrap().inner_diameter_mm < catalog.get(i).unwrap().inner_diameter_mm
        }));
    }

    #[rstest]
    fn should_reject_unknown_material() {
        assert!(PipeCatalog::filtered("PE", "2v").is_err());
    }

    #[rstest]
    fn should_find_closest_standard_diameter() {
        let catalog = PipeCatalog::filtered("KMR", "2v").unwrap();

        let position = catalog.closest(0.1);

        assert_eq!(catalog.get(position).unwrap().name, "KMR 100/225-2v");
        assert_eq!(catalog.position("KMR 100/225-2v"), Some(position));
        assert_eq!(catalog.get(catalog.closest(10.)).unwrap().name, "KMR 300/500-2v");
    }

    #[rstest]
    fn should_relate_heat_loss_to_inner_surface() {
        let pipe_type = PipeCatalog::filtered("KMR", "1v").unwrap().get(7).unwrap();

        assert_relative_eq!(
            pipe_type.heat_transfer_coefficient() * PI * 0.1071,
            0.232,
            max_relative = 1e-12
        );
    }
}
