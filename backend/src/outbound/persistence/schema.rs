//! Diesel table definitions for the farm registry.
//!
//! Kept in step with `backend/migrations` by hand.

diesel::table! {
    /// Farmer accounts and their maintained acreage rollup.
    farmers (id) {
        id -> Uuid,
        /// Sum of active farm areas in square metres; `CHECK >= 0`.
        total_area_m2 -> Int8,
        /// Number of active farms; `CHECK >= 0`.
        farm_count -> Int8,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Farm parcels. Rows with `deleted_at` set are soft deleted.
    farms (id) {
        id -> Uuid,
        farmer_id -> Uuid,
        /// Closed boundary ring as `[{"lng": .., "lat": ..}, ..]`.
        boundary -> Jsonb,
        /// Geodesic area at write time, square metres.
        area_m2 -> Int8,
        min_lng -> Float8,
        min_lat -> Float8,
        max_lng -> Float8,
        max_lat -> Float8,
        metadata -> Jsonb,
        /// Optimistic concurrency token.
        version -> Int8,
        deleted_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(farms -> farmers (farmer_id));

diesel::allow_tables_to_appear_in_same_query!(farmers, farms);
