// tests/unit_properties.rs

mod common;
use crate::common::builders::BatchConfigBuilder;

use proptest::prelude::*;

use rapid_batch::engine::{StateChain, build_chains};
use rapid_batch::plan::TaskEnumerator;
use rapid_batch::units::{ArtifactRef, ComputeRequest, SimulationUnit, YearMonth};

fn year_month_strategy() -> impl Strategy<Value = YearMonth> {
    (1950i32..2100, 1u8..=12).prop_map(|(y, m)| YearMonth::new(y, m).unwrap())
}

fn unit_strategy() -> impl Strategy<Value = SimulationUnit> {
    (
        "[0-9]{1,3}",
        prop::sample::select(vec!["GLDAS", "NLDAS"]),
        prop::sample::select(vec!["VIC", "NOAH", "MOS"]),
        prop::sample::select(vec!["3H", "H", "M"]),
        year_month_strategy(),
    )
        .prop_map(|(basin, exp, model, step, ym)| SimulationUnit::new(basin, exp, model, step, ym))
}

proptest! {
    #[test]
    fn next_and_prev_are_inverse(ym in year_month_strategy()) {
        prop_assert_eq!(ym.next().prev(), ym);
        prop_assert_eq!(ym.prev().next(), ym);
        prop_assert!(ym.next() > ym);
    }

    #[test]
    fn december_rolls_into_the_next_year(year in 1950i32..2100) {
        let december = YearMonth::new(year, 12).unwrap();
        prop_assert_eq!(december.next(), YearMonth::new(year + 1, 1).unwrap());
        prop_assert_eq!(december.next().to_string(), format!("{}-01", year + 1));
    }

    #[test]
    fn carried_state_lands_in_the_successor_directory(u in unit_strategy()) {
        let key = ArtifactRef::carried_state(&u).remote_key();
        let next = u.successor();
        let expected_prefix = format!(
            "pfaf_{}/{}/{}/{}/{}/Qinit_",
            next.basin_id, next.experiment, next.model, next.step, next.year_month
        );
        prop_assert!(key.starts_with(&expected_prefix), "{}", key);
        prop_assert!(key.ends_with(".nc"));
        prop_assert!(!key.contains("_utc"));
        prop_assert_eq!(key, ArtifactRef::initial_state(&next).remote_key());
    }

    #[test]
    fn request_json_round_trips_and_dedups(u in unit_strategy()) {
        let request = ComputeRequest::for_unit(&u, "currnt-data");
        let parsed: ComputeRequest = serde_json::from_str(&request.to_json()).unwrap();
        prop_assert_eq!(parsed.unit(), u);
        prop_assert_eq!(parsed.dedup_key(), request.dedup_key());
    }

    #[test]
    fn enumeration_is_the_full_product(
        basins in 1usize..4,
        years in 0i32..3,
        months in prop::sample::subsequence(
            vec!["01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12"],
            1..=12,
        ),
    ) {
        let basin_ids: Vec<String> = (0..basins).map(|b| format!("{}", b + 10)).collect();
        let basin_refs: Vec<&str> = basin_ids.iter().map(String::as_str).collect();
        let cfg = BatchConfigBuilder::new()
            .basins(&basin_refs)
            .years(1980, 1980 + years)
            .months(&months)
            .experiments(&["NLDAS"])
            .build();

        let units = TaskEnumerator::from_config(&cfg).enumerate();

        // NLDAS maps to three models and two steps
        let expected = basins * (years as usize + 1) * months.len() * 3 * 2;
        prop_assert_eq!(units.len(), expected);

        // every chain is strictly increasing in month
        for chain in build_chains(&units).values() {
            prop_assert!(chain.windows(2).all(|w| w[0].year_month < w[1].year_month));
        }
    }

    #[test]
    fn only_the_origin_runs_without_a_predecessor(u in unit_strategy()) {
        let chain = StateChain::new(Some(u.year_month));
        prop_assert!(chain.next_unit_inputs(&u).chain_origin);
        prop_assert_eq!(chain.next_unit_inputs(&u).required.len(), 1);

        let successor = chain.next_unit_inputs(&u.successor());
        prop_assert!(!successor.chain_origin);
        prop_assert_eq!(&successor.required[1], &ArtifactRef::carried_state(&u));
    }
}
