// Seeds the sample package's tables, resolved as
// `YourDomain\Sample\Seeders\DatabaseSeeder`.
