table! {
    jobs (id) {
        id -> Int8,
        job_id -> Text,
        model_name -> Text,
        method -> Text,
        status -> Text,
        datetime -> Double,
        queue_response_time_sec -> Double,
        total_response_time_sec -> Double,
        response -> Nullable<Jsonb>,
        feedback -> Nullable<Jsonb>,
        has_feedback -> Bool,
        initial_date -> Nullable<Text>,
        end_date -> Nullable<Text>,
        request_source -> Nullable<Text>,
    }
}

table! {
    queue_registry (model_name) {
        model_name -> Text,
        worker_id -> Text,
    }
}
